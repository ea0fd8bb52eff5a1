//! Rate-limited re-validation of the bound license.

use chrono::{DateTime, Utc};

use super::LicenseManager;
use crate::authority::{AuthorityGrant, Endpoint};
use crate::error::{ErrorCode, LicenseError, Result};
use crate::key::mask;
use crate::models::{LicenseEvent, LicenseRecord, LicenseState};

impl LicenseManager {
    /// Re-validate the bound license and return whether features are available.
    ///
    /// Calls within [`MIN_VALIDATION_INTERVAL`](super::MIN_VALIDATION_INTERVAL)
    /// of the previous check return the in-memory verdict without network I/O.
    /// Only a definitive rejection clears persisted data; transport failures
    /// leave it in place and the offline grace window decides.
    pub async fn refresh(&self) -> Result<bool> {
        let _guard = self.transition.lock().await;

        let result = self.refresh_locked().await;
        if let Err(e) = &result {
            self.errors.record_error(e);
            tracing::error!(error = %e, "License refresh failed");
        }
        result
    }

    async fn refresh_locked(&self) -> Result<bool> {
        let now = self.clock.now();
        if self.recently_checked(now) {
            tracing::debug!("Validated recently, reusing verdict");
            return Ok(self.is_feature_available());
        }
        self.mark_checked(now);

        let Some(record) = self.store.load_record()? else {
            self.set_state(LicenseState::Unlicensed, None);
            return Ok(false);
        };

        if self.config.offline_mode.enabled
            && !self.connectivity.is_online()
            && self.offline_acceptable(now)
        {
            tracing::debug!("Offline, trusting cached verdict");
            self.set_state(LicenseState::OfflineGrace, Some(record));
            return Ok(true);
        }

        let client = &self.client;
        let key = record.license_key.as_str();
        let instance_id = record.instance_id.as_str();
        let outcome = self
            .retry
            .with_retry(
                move || async move { client.validate(key, Some(instance_id)).await.into_result() },
                true,
            )
            .await;

        match outcome {
            Ok(grant) => self.accept_validation(record, grant),
            Err(e) if e.is_rejection() || matches!(e, LicenseError::InvalidKeyFormat) => {
                self.invalidate(record, &e.to_string())
            }
            Err(e) => Ok(self.tolerate_failure(record, &e)),
        }
    }

    fn accept_validation(&self, record: LicenseRecord, grant: AuthorityGrant) -> Result<bool> {
        if let Some(instance) = &grant.instance
            && instance.id != record.instance_id
        {
            let reason = format!(
                "license is bound to instance {} instead of {}",
                instance.id, record.instance_id
            );
            return self.invalidate(record, &reason);
        }

        let validated_at = self.clock.now();
        let valid_until = grant.license_key.as_ref().and_then(|d| d.expires_at);

        self.store
            .save_validation(&grant.raw, validated_at, valid_until)?;
        self.cache_response(Endpoint::Validate, &record.license_key, &grant.raw);
        self.cache_verdict(validated_at)?;
        self.note_connectivity(true);

        tracing::debug!(key = %mask(&record.license_key), "License validated");

        self.set_state(
            LicenseState::Licensed,
            Some(LicenseRecord {
                last_validated_at: Some(validated_at),
                valid_until,
                api_data: grant.raw,
                ..record
            }),
        );
        Ok(true)
    }

    /// The authority said no: clear everything and tell subscribers why.
    fn invalidate(&self, record: LicenseRecord, reason: &str) -> Result<bool> {
        tracing::warn!(
            key = %mask(&record.license_key),
            reason,
            "License invalidated, clearing local state"
        );
        self.errors
            .record(ErrorCode::LicenseRejected, reason.to_string(), false);
        self.note_connectivity(true);

        let license_key = record.license_key.clone();
        self.set_state(LicenseState::Invalidated, Some(record));
        self.emit(LicenseEvent::Invalidated {
            reason: reason.to_string(),
        });

        self.clear_local(&license_key)?;
        self.set_state(LicenseState::Unlicensed, None);
        Ok(false)
    }

    /// Network trouble after retries: keep persisted data, let the grace window decide.
    fn tolerate_failure(&self, record: LicenseRecord, error: &LicenseError) -> bool {
        self.errors.record_error(error);
        self.note_connectivity(false);

        if !self.config.offline_mode.enabled {
            tracing::warn!(error = %error, "Validation unavailable, keeping current verdict");
            return self.is_feature_available();
        }

        let now: DateTime<Utc> = self.clock.now();
        if self.offline_acceptable(now) {
            tracing::warn!(error = %error, "Validation unavailable, using offline grace");
            self.set_state(LicenseState::OfflineGrace, Some(record));
            true
        } else {
            tracing::warn!(error = %error, "Validation unavailable and offline grace expired");
            self.set_state(LicenseState::Unlicensed, Some(record));
            false
        }
    }
}
