use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Everything persisted about the bound license.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseRecord {
    pub license_key: String,
    pub instance_id: String,
    /// Absent when the persisted timestamp is missing or unreadable
    pub last_validated_at: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    /// Last raw authority response
    pub api_data: serde_json::Value,
}

impl LicenseRecord {
    /// Whether the authority-reported expiry has passed.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.valid_until.map(|until| until <= now).unwrap_or(false)
    }

    /// Customer email from the stored authority response, if any.
    pub fn customer_email(&self) -> Option<String> {
        self.api_data
            .pointer("/meta/customer_email")
            .and_then(|v| v.as_str())
            .map(String::from)
    }
}

/// Snapshot the offline cache may substitute for a live check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedVerdict {
    pub is_licensed: bool,
    pub cached_at: DateTime<Utc>,
    pub offline_enabled: bool,
}
