//! Retry executor and the bounded error history.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::clock::Clock;
use crate::config::Config;
use crate::error::{ErrorCode, LicenseError, Result};

/// One entry in the error history.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionError {
    pub code: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub retryable: bool,
}

/// Error log capped by count and by age. Oldest entries go first.
pub struct ErrorHistory {
    entries: Mutex<VecDeque<ExtensionError>>,
    max_entries: usize,
    retention: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl ErrorHistory {
    pub fn new(max_entries: usize, retention: chrono::Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(max_entries.min(128))),
            max_entries,
            retention,
            clock,
        }
    }

    pub fn from_config(config: &Config, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            config.error_tracking.max_errors,
            config.error_retention(),
            clock,
        )
    }

    pub fn record(&self, code: ErrorCode, message: impl Into<String>, retryable: bool) {
        let now = self.clock.now();
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        entries.push_back(ExtensionError {
            code: code.to_string(),
            message: message.into(),
            timestamp: now,
            retryable,
        });
        Self::evict(&mut entries, now, self.retention, self.max_entries);
    }

    pub fn record_error(&self, error: &LicenseError) {
        self.record(error.code(), error.to_string(), error.is_retryable());
    }

    /// Drop entries past the retention window. Returns how many were dropped.
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now();
        let Ok(mut entries) = self.entries.lock() else {
            return 0;
        };
        let before = entries.len();
        Self::evict(&mut entries, now, self.retention, self.max_entries);
        before - entries.len()
    }

    /// Current entries, oldest first.
    pub fn entries(&self) -> Vec<ExtensionError> {
        self.cleanup();
        self.entries
            .lock()
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    fn evict(
        entries: &mut VecDeque<ExtensionError>,
        now: DateTime<Utc>,
        retention: chrono::Duration,
        max_entries: usize,
    ) {
        while entries
            .front()
            .is_some_and(|oldest| now - oldest.timestamp > retention)
        {
            entries.pop_front();
        }
        while entries.len() > max_entries {
            entries.pop_front();
        }
    }
}

impl std::fmt::Debug for ErrorHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorHistory")
            .field("len", &self.len())
            .field("max_entries", &self.max_entries)
            .field("retention", &self.retention)
            .finish()
    }
}

/// Runs an operation up to `max_retries` times with a fixed delay between attempts.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    max_retries: u32,
    delay: Duration,
    history: Arc<ErrorHistory>,
}

impl RetryExecutor {
    pub fn new(max_retries: u32, delay: Duration, history: Arc<ErrorHistory>) -> Self {
        Self {
            max_retries: max_retries.max(1),
            delay,
            history,
        }
    }

    pub fn from_config(config: &Config, history: Arc<ErrorHistory>) -> Self {
        Self::new(config.max_retries, config.retry_delay(), history)
    }

    pub fn history(&self) -> &Arc<ErrorHistory> {
        &self.history
    }

    /// Execute `operation`, retrying retryable failures.
    ///
    /// Every failed attempt is logged as `RETRY_ERROR`. With `retryable ==
    /// false`, or for errors that are terminal by kind (format errors,
    /// rejections), the first failure is returned immediately.
    pub async fn with_retry<T, F, Fut>(&self, mut operation: F, retryable: bool) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = if retryable { self.max_retries } else { 1 };
        let mut attempt = 0;

        loop {
            attempt += 1;
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            let will_retry = retryable && error.is_retryable() && attempt < max_attempts;
            self.history.record(
                ErrorCode::RetryError,
                format!("attempt {}/{} failed: {}", attempt, max_attempts, error),
                retryable && error.is_retryable(),
            );

            if !will_retry {
                tracing::warn!(attempt, max_attempts, error = %error, "Giving up");
                return Err(error);
            }

            tracing::warn!(
                attempt,
                max_attempts,
                delay_ms = self.delay.as_millis() as u64,
                error = %error,
                "Attempt failed, retrying"
            );
            tokio::time::sleep(self.delay).await;
        }
    }
}
