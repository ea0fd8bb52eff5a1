//! License state machine.
//!
//! One [`LicenseManager`] owns the bound license for the whole process. The
//! host creates it with [`init`], passes the returned handle to everything
//! that needs a verdict, and tears it down with [`dispose`].
//!
//! # States
//!
//! ```text
//! Unlicensed ──activate──▶ Licensed ◀──refresh ok── OfflineGrace
//!     ▲                      │  │                        ▲
//!     │                      │  └──transport error, in grace window──┘
//!     │                  rejected
//!     │                      ▼
//!     └────cleanup────── Invalidated
//! ```
//!
//! Transitions are serialized by an async mutex. Reads of the verdict go
//! through a plain `RwLock` and never wait on the network, so
//! [`LicenseManager::is_feature_available`] stays cheap while a check is in flight.

mod lifecycle;
mod refresh;
mod scheduler;

use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::authority::{AuthorityClient, Endpoint};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::{LicenseError, Result};
use crate::models::{CachedVerdict, LicenseEvent, LicenseRecord, LicenseSnapshot, LicenseState};
use crate::offline::{CachedResponse, Connectivity, OfflineCache, ResponseCache};
use crate::retry::{ErrorHistory, ExtensionError, RetryExecutor};
use crate::storage::{LicenseStore, StateStore};

pub use lifecycle::DeactivationReport;

/// Live checks closer together than this are collapsed into one.
pub const MIN_VALIDATION_INTERVAL: std::time::Duration = std::time::Duration::from_secs(5 * 60);

const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Shared handle to the process's license manager.
pub type LicenseHandle = Arc<LicenseManager>;

/// Build the license manager from config and the host's durable store.
pub fn init(config: Config, store: Arc<dyn StateStore>) -> Result<LicenseHandle> {
    LicenseManager::init_with_clock(config, store, Arc::new(SystemClock))
}

/// Stop background work. Outstanding handles stay readable but no longer refresh.
pub fn dispose(handle: LicenseHandle) {
    handle.shutdown();
}

#[derive(Debug, Clone)]
struct Verdict {
    state: LicenseState,
    record: Option<LicenseRecord>,
}

pub struct LicenseManager {
    config: Config,
    store: LicenseStore,
    client: AuthorityClient,
    retry: RetryExecutor,
    errors: Arc<ErrorHistory>,
    clock: Arc<dyn Clock>,
    verdict: RwLock<Verdict>,
    offline: Mutex<OfflineCache>,
    connectivity: Connectivity,
    transition: tokio::sync::Mutex<()>,
    last_check: Mutex<Option<DateTime<Utc>>>,
    events: broadcast::Sender<LicenseEvent>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl LicenseManager {
    pub fn init_with_clock(
        config: Config,
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<LicenseHandle> {
        config.validate()?;

        let client = AuthorityClient::new(&config.authority)?;
        let errors = Arc::new(ErrorHistory::from_config(&config, clock.clone()));
        let retry = RetryExecutor::from_config(&config, errors.clone());
        let store = LicenseStore::new(store);
        let now = clock.now();

        let mut offline = store.offline_mode()?.unwrap_or_default();
        offline.enabled = config.offline_mode.enabled;

        let record = store.load_record()?;
        let state = initial_state(record.as_ref(), &offline, &config, now);

        tracing::info!(
            state = %state,
            bound = record.is_some(),
            offline_enabled = offline.enabled,
            "License manager initialized"
        );

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Arc::new(Self {
            config,
            store,
            client,
            retry,
            errors,
            clock,
            verdict: RwLock::new(Verdict { state, record }),
            offline: Mutex::new(offline),
            connectivity: Connectivity::new(),
            transition: tokio::sync::Mutex::new(()),
            last_check: Mutex::new(None),
            events,
            tasks: Mutex::new(Vec::new()),
        }))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Gate for every premium action. Never touches the network.
    pub fn is_feature_available(&self) -> bool {
        self.state().is_feature_available()
    }

    pub fn state(&self) -> LicenseState {
        self.verdict
            .read()
            .map(|v| v.state)
            .unwrap_or(LicenseState::Unlicensed)
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    /// Current license status for display.
    pub fn license_state(&self) -> LicenseSnapshot {
        let verdict = self.verdict.read().map(|v| v.clone()).unwrap_or(Verdict {
            state: LicenseState::Unlicensed,
            record: None,
        });
        let now = self.clock.now();
        let grace_remaining_secs = self
            .offline
            .lock()
            .map(|o| {
                o.remaining_grace_window(self.config.offline_cache_duration(), now)
                    .num_seconds()
            })
            .unwrap_or(0);

        LicenseSnapshot {
            state: verdict.state,
            license_key: verdict.record.as_ref().map(|r| r.license_key.clone()),
            instance_id: verdict.record.as_ref().map(|r| r.instance_id.clone()),
            last_validated: verdict.record.as_ref().and_then(|r| r.last_validated_at),
            valid_until: verdict.record.as_ref().and_then(|r| r.valid_until),
            customer_email: verdict.record.as_ref().and_then(|r| r.customer_email()),
            is_online: self.connectivity.is_online(),
            grace_remaining_secs,
            feature_available: verdict.state.is_feature_available(),
        }
    }

    /// Receive every state change, invalidation and connectivity flip.
    pub fn subscribe(&self) -> broadcast::Receiver<LicenseEvent> {
        self.events.subscribe()
    }

    /// Bounded error log, oldest first.
    pub fn error_history(&self) -> Vec<ExtensionError> {
        self.errors.entries()
    }

    /// Last raw authority response cached for `endpoint` and `license_key`.
    pub fn cached_response(
        &self,
        endpoint: Endpoint,
        license_key: &str,
    ) -> Result<Option<CachedResponse>> {
        Ok(self.store.api_cache()?.and_then(|cache| {
            cache
                .get(&ResponseCache::cache_key(endpoint.as_str(), license_key))
                .cloned()
        }))
    }

    fn set_state(&self, to: LicenseState, record: Option<LicenseRecord>) {
        let from = match self.verdict.write() {
            Ok(mut verdict) => {
                let from = verdict.state;
                verdict.state = to;
                verdict.record = record;
                from
            }
            Err(_) => return,
        };

        if from != to {
            tracing::info!(from = %from, to = %to, "License state changed");
            self.emit(LicenseEvent::StateChanged { from, to });
        }
    }

    fn emit(&self, event: LicenseEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Returns true when the online flag flipped.
    fn note_connectivity(&self, online: bool) -> bool {
        let flipped = self.connectivity.record(online, self.clock.now());
        if flipped {
            tracing::info!(online, "Licensing service connectivity changed");
            self.emit(LicenseEvent::ConnectivityChanged { online });
        }
        flipped
    }

    fn recently_checked(&self, now: DateTime<Utc>) -> bool {
        let window = chrono::Duration::seconds(MIN_VALIDATION_INTERVAL.as_secs() as i64);
        self.last_check
            .lock()
            .ok()
            .and_then(|last| *last)
            .is_some_and(|last| now >= last && now - last < window)
    }

    fn mark_checked(&self, at: DateTime<Utc>) {
        if let Ok(mut last) = self.last_check.lock() {
            *last = Some(at);
        }
    }

    fn offline_acceptable(&self, now: DateTime<Utc>) -> bool {
        self.offline
            .lock()
            .map(|o| o.is_offline_acceptable(self.config.offline_cache_duration(), now))
            .unwrap_or(false)
    }

    /// Record a licensed verdict from a live check and persist it.
    fn cache_verdict(&self, at: DateTime<Utc>) -> Result<()> {
        let snapshot = {
            let mut offline = self
                .offline
                .lock()
                .map_err(|_| LicenseError::Storage("offline cache lock poisoned".into()))?;
            offline.cache_valid_verdict(CachedVerdict {
                is_licensed: true,
                cached_at: at,
                offline_enabled: self.config.offline_mode.enabled,
            });
            offline.clone()
        };
        self.store.set_offline_mode(&snapshot)
    }

    /// Remember the raw response under `apiCache`. Failures only cost diagnostics.
    fn cache_response(&self, endpoint: Endpoint, license_key: &str, raw: &serde_json::Value) {
        let result = self.store.api_cache().and_then(|cache| {
            let mut cache = cache.unwrap_or_default();
            cache.insert(
                ResponseCache::cache_key(endpoint.as_str(), license_key),
                raw.clone(),
                self.clock.now(),
                self.config.offline_cache_duration(),
            );
            self.store.set_api_cache(&cache)
        });
        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to cache authority response");
        }
    }

    /// Erase every persisted trace of `license_key`.
    fn clear_local(&self, license_key: &str) -> Result<()> {
        self.store.clear_record()?;

        let snapshot = {
            let mut offline = self
                .offline
                .lock()
                .map_err(|_| LicenseError::Storage("offline cache lock poisoned".into()))?;
            offline.clear();
            offline.clone()
        };
        self.store.set_offline_mode(&snapshot)?;

        if let Some(mut cache) = self.store.api_cache()? {
            cache.remove_license(license_key);
            self.store.set_api_cache(&cache)?;
        }
        Ok(())
    }

    fn shutdown(&self) {
        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
        tracing::info!("License manager disposed");
    }
}

impl std::fmt::Debug for LicenseManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LicenseManager")
            .field("state", &self.state())
            .field("online", &self.connectivity.is_online())
            .finish_non_exhaustive()
    }
}

/// Verdict to show before the first live check of this process.
fn initial_state(
    record: Option<&LicenseRecord>,
    offline: &OfflineCache,
    config: &Config,
    now: DateTime<Utc>,
) -> LicenseState {
    match record {
        None => LicenseState::Unlicensed,
        Some(r) if r.is_expired_at(now) => LicenseState::Unlicensed,
        // Without offline mode the last live verdict stands until the startup check.
        Some(_) if !offline.enabled => LicenseState::Licensed,
        Some(_) if offline.is_offline_acceptable(config.offline_cache_duration(), now) => {
            LicenseState::Licensed
        }
        Some(_) => LicenseState::Unlicensed,
    }
}
