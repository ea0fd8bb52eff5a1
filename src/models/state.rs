use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LicenseState {
    /// No key bound, or the last verdict could not be trusted
    Unlicensed,
    /// Key bound and the last live check succeeded
    Licensed,
    /// The authority rejected a bound key; local data has been cleared
    Invalidated,
    /// Key bound, authority unreachable, cached verdict still inside the grace window
    OfflineGrace,
}

impl LicenseState {
    pub fn is_feature_available(self) -> bool {
        matches!(self, LicenseState::Licensed | LicenseState::OfflineGrace)
    }
}

impl std::fmt::Display for LicenseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}

/// What the UI needs to render license status.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseSnapshot {
    pub state: LicenseState,
    pub license_key: Option<String>,
    pub instance_id: Option<String>,
    pub last_validated: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub customer_email: Option<String>,
    pub is_online: bool,
    /// Seconds left in the offline grace window
    pub grace_remaining_secs: i64,
    pub feature_available: bool,
}

/// Published on the change-notification channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LicenseEvent {
    StateChanged {
        from: LicenseState,
        to: LicenseState,
    },
    /// A bound license was revoked, removed or found to belong elsewhere
    Invalidated { reason: String },
    ConnectivityChanged { online: bool },
}
