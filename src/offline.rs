//! Offline cache manager and connectivity tracking.
//!
//! Verdict caching decides whether the last licensed verdict may stand in for
//! a live check. Connectivity tracking only drives display; a failed ping
//! never touches the cached verdict.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::CachedVerdict;

/// Persisted under `offlineMode`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineCache {
    pub enabled: bool,
    pub last_online_check: Option<DateTime<Utc>>,
    pub cached_verdict: Option<CachedVerdict>,
}

impl OfflineCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    /// Record the verdict of a successful live validation.
    pub fn cache_valid_verdict(&mut self, verdict: CachedVerdict) {
        self.last_online_check = Some(verdict.cached_at);
        self.cached_verdict = Some(verdict);
    }

    /// True only if offline mode is on, the cached verdict was licensed, and
    /// less than `cache_duration` has passed since the last online check.
    pub fn is_offline_acceptable(&self, cache_duration: Duration, now: DateTime<Utc>) -> bool {
        if !self.enabled {
            return false;
        }
        let (Some(verdict), Some(last_check)) = (self.cached_verdict, self.last_online_check) else {
            return false;
        };
        if !verdict.is_licensed {
            return false;
        }

        let elapsed = now - last_check;
        // A clock that ran backwards is ambiguous, so it does not count.
        elapsed >= Duration::zero() && elapsed < cache_duration
    }

    /// Time left before the grace window closes; zero without a licensed verdict.
    pub fn remaining_grace_window(&self, cache_duration: Duration, now: DateTime<Utc>) -> Duration {
        match (self.cached_verdict, self.last_online_check) {
            (Some(verdict), Some(last_check)) if verdict.is_licensed => last_check
                .checked_add_signed(cache_duration)
                .map(|closes| (closes - now).max(Duration::zero()))
                .unwrap_or(Duration::zero()),
            _ => Duration::zero(),
        }
    }

    /// Forget the cached verdict; offline mode stays as configured.
    pub fn clear(&mut self) {
        self.last_online_check = None;
        self.cached_verdict = None;
    }
}

/// Last raw authority response per endpoint and key, persisted under `apiCache`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseCache {
    entries: HashMap<String, CachedResponse>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedResponse {
    pub response: serde_json::Value,
    pub cached_at: DateTime<Utc>,
}

impl ResponseCache {
    pub fn cache_key(endpoint: &str, license_key: &str) -> String {
        format!("{}:{}", endpoint, license_key)
    }

    /// Store a response, dropping entries older than `max_age` first.
    pub fn insert(
        &mut self,
        key: String,
        response: serde_json::Value,
        now: DateTime<Utc>,
        max_age: Duration,
    ) {
        self.purge_expired(now, max_age);
        self.entries.insert(
            key,
            CachedResponse {
                response,
                cached_at: now,
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<&CachedResponse> {
        self.entries.get(key)
    }

    /// Remove entries older than `max_age`. Returns how many were dropped.
    pub fn purge_expired(&mut self, now: DateTime<Utc>, max_age: Duration) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| now - entry.cached_at < max_age);
        before - self.entries.len()
    }

    /// Drop every entry recorded for `license_key`.
    pub fn remove_license(&mut self, license_key: &str) {
        let suffix = format!(":{}", license_key);
        self.entries.retain(|key, _| !key.ends_with(&suffix));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Reachability of the licensing authority, as observed by pings and requests.
#[derive(Debug)]
pub struct Connectivity {
    online: AtomicBool,
    last_ping: Mutex<Option<DateTime<Utc>>>,
}

impl Connectivity {
    pub fn new() -> Self {
        Self {
            online: AtomicBool::new(true),
            last_ping: Mutex::new(None),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Record an observation. Returns true when the online flag flipped.
    pub fn record(&self, online: bool, at: DateTime<Utc>) -> bool {
        if let Ok(mut last) = self.last_ping.lock() {
            *last = Some(at);
        }
        self.online.swap(online, Ordering::SeqCst) != online
    }

    pub fn last_ping(&self) -> Option<DateTime<Utc>> {
        self.last_ping.lock().ok().and_then(|last| *last)
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new()
    }
}
