//! User-initiated activation and deactivation. Both are one-shot: errors go
//! straight back to the caller without retries.

use serde::Serialize;
use uuid::Uuid;

use super::LicenseManager;
use crate::authority::{AuthorityGrant, AuthorityResult, Endpoint};
use crate::error::{LicenseError, Result};
use crate::key::{LicenseKey, mask};
use crate::models::{LicenseRecord, LicenseSnapshot, LicenseState};

/// Outcome of [`LicenseManager::deactivate`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeactivationReport {
    pub instance_id: Option<String>,
    /// Authority's answer; `None` when there was no instance to release
    pub remote: Option<AuthorityResult>,
}

impl DeactivationReport {
    /// Whether the authority confirmed the instance slot was released.
    pub fn remote_confirmed(&self) -> bool {
        self.remote.as_ref().is_some_and(AuthorityResult::is_valid)
    }
}

impl LicenseManager {
    /// Bind `raw_key` to this installation.
    ///
    /// Refused with [`LicenseError::AlreadyBound`] while another key is bound.
    pub async fn activate(&self, raw_key: &str) -> Result<LicenseSnapshot> {
        let _guard = self.transition.lock().await;

        let result = self.activate_locked(raw_key).await;
        if let Err(e) = &result {
            self.errors.record_error(e);
            tracing::warn!(key = %mask(raw_key.trim()), error = %e, "License activation failed");
        }
        result
    }

    async fn activate_locked(&self, raw_key: &str) -> Result<LicenseSnapshot> {
        if self.store.license_key()?.is_some() {
            return Err(LicenseError::AlreadyBound);
        }

        let key = LicenseKey::parse(raw_key)?;

        let validation = self.client.validate(key.as_str(), None).await.into_result()?;
        self.cache_response(Endpoint::Validate, key.as_str(), &validation.raw);

        let instance_name = self.instance_name();
        let activation = self
            .client
            .activate(key.as_str(), &instance_name)
            .await
            .into_result()?;
        self.cache_response(Endpoint::Activate, key.as_str(), &activation.raw);

        let instance = activation
            .instance
            .clone()
            .ok_or_else(|| LicenseError::rejected("activation response did not include an instance"))?;

        let now = self.clock.now();
        let record = LicenseRecord {
            license_key: key.to_string(),
            instance_id: instance.id.clone(),
            last_validated_at: Some(now),
            valid_until: expires_at(&activation).or_else(|| expires_at(&validation)),
            api_data: activation.raw,
        };

        self.store.save_record(&record)?;
        self.cache_verdict(now)?;
        self.mark_checked(now);
        self.note_connectivity(true);
        self.set_state(LicenseState::Licensed, Some(record));

        tracing::info!(
            key = %key.masked(),
            instance_id = %instance.id,
            instance_name = %instance_name,
            "License activated"
        );

        Ok(self.license_state())
    }

    /// Release the bound license.
    ///
    /// Local trust is revoked before the authority is contacted, so the
    /// installation ends up unlicensed whatever the remote outcome.
    pub async fn deactivate(&self) -> Result<DeactivationReport> {
        let _guard = self.transition.lock().await;

        let result = self.deactivate_locked().await;
        if let Err(e) = &result {
            self.errors.record_error(e);
            tracing::warn!(error = %e, "License deactivation failed");
        }
        result
    }

    async fn deactivate_locked(&self) -> Result<DeactivationReport> {
        let Some(license_key) = self.store.license_key()? else {
            return Err(LicenseError::NotBound);
        };
        let instance_id = self.store.instance_id()?;

        self.set_state(LicenseState::Unlicensed, None);
        self.clear_local(&license_key)?;
        tracing::info!(key = %mask(&license_key), "Local license state cleared");

        let Some(id) = instance_id.clone() else {
            tracing::warn!("No instance recorded, skipping remote deactivation");
            return Ok(DeactivationReport {
                instance_id: None,
                remote: None,
            });
        };

        let remote = self.client.deactivate(&license_key, &id).await;
        match remote.clone().into_result() {
            Ok(_) => tracing::info!(instance_id = %id, "License deactivated"),
            Err(e) => {
                self.errors.record_error(&e);
                tracing::warn!(
                    instance_id = %id,
                    error = %e,
                    "Remote deactivation failed; local license already cleared"
                );
            }
        }

        Ok(DeactivationReport {
            instance_id,
            remote: Some(remote),
        })
    }

    /// Unique instance name sent on activation.
    fn instance_name(&self) -> String {
        format!(
            "{}-{}",
            self.config.authority.instance_name_prefix,
            Uuid::new_v4()
        )
    }
}

fn expires_at(grant: &AuthorityGrant) -> Option<chrono::DateTime<chrono::Utc>> {
    grant.license_key.as_ref().and_then(|details| details.expires_at)
}
