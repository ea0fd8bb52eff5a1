use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{LicenseError, Result};

pub const DEFAULT_API_BASE_URL: &str = "https://api.lemonsqueezy.com";
pub const DEFAULT_STORE_ID: u64 = 157343;
pub const DEFAULT_PRODUCT_ID: u64 = 463516;

/// Upper bounds keeping every derived duration and timestamp representable.
pub const MAX_HOURS: u64 = 10 * 365 * 24;
pub const MAX_RETENTION_DAYS: u64 = 10 * 365;
pub const MAX_RETRY_DELAY_MS: u64 = 60 * 60 * 1000;
pub const MAX_SECONDS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Attempts per background validation before giving up
    pub max_retries: u32,
    /// Fixed delay between attempts, in milliseconds
    #[serde(rename = "retryDelay")]
    pub retry_delay_ms: u64,
    /// Hours between scheduled re-validations
    #[serde(rename = "validationInterval")]
    pub validation_interval_hours: u64,
    pub offline_mode: OfflineModeConfig,
    pub error_tracking: ErrorTrackingConfig,
    pub authority: AuthorityConfig,
    pub connectivity: ConnectivityConfig,
    /// Directory for the file store (platform data dir when unset)
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OfflineModeConfig {
    pub enabled: bool,
    /// How long a cached licensed verdict is trusted without a live check, in hours
    #[serde(rename = "cacheDuration")]
    pub cache_duration_hours: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ErrorTrackingConfig {
    pub max_errors: usize,
    /// Days to retain error history entries
    #[serde(rename = "cleanupInterval")]
    pub cleanup_interval_days: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthorityConfig {
    pub api_base_url: String,
    /// Responses for any other store are rejected
    pub store_id: u64,
    /// Responses for any other product are rejected
    pub product_id: u64,
    #[serde(rename = "requestTimeout")]
    pub request_timeout_secs: u64,
    pub instance_name_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectivityConfig {
    #[serde(rename = "pingInterval")]
    pub ping_interval_secs: u64,
    #[serde(rename = "pingTimeout")]
    pub ping_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 5000,
            validation_interval_hours: 24,
            offline_mode: OfflineModeConfig::default(),
            error_tracking: ErrorTrackingConfig::default(),
            authority: AuthorityConfig::default(),
            connectivity: ConnectivityConfig::default(),
            data_dir: None,
        }
    }
}

impl Default for OfflineModeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_duration_hours: 72,
        }
    }
}

impl Default for ErrorTrackingConfig {
    fn default() -> Self {
        Self {
            max_errors: 100,
            cleanup_interval_days: 7,
        }
    }
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            store_id: DEFAULT_STORE_ID,
            product_id: DEFAULT_PRODUCT_ID,
            request_timeout_secs: 10,
            instance_name_prefix: "lemonlock".to_string(),
        }
    }
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            ping_interval_secs: 60,
            ping_timeout_secs: 5,
        }
    }
}

/// Parse an env var, falling back to `default` when unset or unparseable.
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let offline_enabled = env::var("LEMONLOCK_OFFLINE_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(defaults.offline_mode.enabled);

        Self {
            max_retries: env_or("LEMONLOCK_MAX_RETRIES", defaults.max_retries),
            retry_delay_ms: env_or("LEMONLOCK_RETRY_DELAY_MS", defaults.retry_delay_ms),
            validation_interval_hours: env_or(
                "LEMONLOCK_VALIDATION_INTERVAL_HOURS",
                defaults.validation_interval_hours,
            ),
            offline_mode: OfflineModeConfig {
                enabled: offline_enabled,
                cache_duration_hours: env_or(
                    "LEMONLOCK_OFFLINE_CACHE_HOURS",
                    defaults.offline_mode.cache_duration_hours,
                ),
            },
            error_tracking: ErrorTrackingConfig {
                max_errors: env_or("LEMONLOCK_MAX_ERRORS", defaults.error_tracking.max_errors),
                cleanup_interval_days: env_or(
                    "LEMONLOCK_ERROR_RETENTION_DAYS",
                    defaults.error_tracking.cleanup_interval_days,
                ),
            },
            authority: AuthorityConfig {
                api_base_url: env::var("LEMONLOCK_API_BASE_URL")
                    .unwrap_or(defaults.authority.api_base_url),
                store_id: env_or("LEMONLOCK_STORE_ID", defaults.authority.store_id),
                product_id: env_or("LEMONLOCK_PRODUCT_ID", defaults.authority.product_id),
                request_timeout_secs: env_or(
                    "LEMONLOCK_REQUEST_TIMEOUT_SECS",
                    defaults.authority.request_timeout_secs,
                ),
                instance_name_prefix: defaults.authority.instance_name_prefix,
            },
            connectivity: defaults.connectivity,
            data_dir: env::var("LEMONLOCK_DATA_DIR").ok().map(PathBuf::from),
        }
    }

    /// Reject values that would make the retry or cache logic degenerate.
    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(LicenseError::Config("maxRetries must be at least 1".into()));
        }
        if self.offline_mode.cache_duration_hours == 0 {
            return Err(LicenseError::Config(
                "offlineMode.cacheDuration must be greater than zero".into(),
            ));
        }
        if self.error_tracking.max_errors == 0 {
            return Err(LicenseError::Config(
                "errorTracking.maxErrors must be at least 1".into(),
            ));
        }
        if self.validation_interval_hours == 0 {
            return Err(LicenseError::Config(
                "validationInterval must be at least 1 hour".into(),
            ));
        }
        if self.connectivity.ping_interval_secs == 0 || self.connectivity.ping_timeout_secs == 0 {
            return Err(LicenseError::Config(
                "connectivity ping interval and timeout must be positive".into(),
            ));
        }
        if self.validation_interval_hours > MAX_HOURS {
            return Err(LicenseError::Config(format!(
                "validationInterval must be at most {} hours",
                MAX_HOURS
            )));
        }
        if self.offline_mode.cache_duration_hours > MAX_HOURS {
            return Err(LicenseError::Config(format!(
                "offlineMode.cacheDuration must be at most {} hours",
                MAX_HOURS
            )));
        }
        if self.error_tracking.cleanup_interval_days > MAX_RETENTION_DAYS {
            return Err(LicenseError::Config(format!(
                "errorTracking.cleanupInterval must be at most {} days",
                MAX_RETENTION_DAYS
            )));
        }
        if self.retry_delay_ms > MAX_RETRY_DELAY_MS {
            return Err(LicenseError::Config(format!(
                "retryDelay must be at most {} ms",
                MAX_RETRY_DELAY_MS
            )));
        }
        if self.connectivity.ping_interval_secs > MAX_SECONDS
            || self.connectivity.ping_timeout_secs > MAX_SECONDS
            || self.authority.request_timeout_secs > MAX_SECONDS
        {
            return Err(LicenseError::Config(format!(
                "ping and request timings must be at most {} seconds",
                MAX_SECONDS
            )));
        }
        if self.authority.api_base_url.trim().is_empty() {
            return Err(LicenseError::Config("authority.apiBaseUrl is empty".into()));
        }
        Ok(())
    }

    pub fn retry_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.retry_delay_ms.min(MAX_RETRY_DELAY_MS))
    }

    pub fn validation_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.validation_interval_hours.min(MAX_HOURS) * 3600)
    }

    pub fn ping_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.connectivity.ping_interval_secs.min(MAX_SECONDS))
    }

    pub fn ping_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.connectivity.ping_timeout_secs.min(MAX_SECONDS))
    }

    pub fn offline_cache_duration(&self) -> chrono::Duration {
        chrono::Duration::hours(self.offline_mode.cache_duration_hours.min(MAX_HOURS) as i64)
    }

    pub fn error_retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.error_tracking.cleanup_interval_days.min(MAX_RETENTION_DAYS) as i64)
    }
}
