//! Shared helpers for license lifecycle tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Duration, Utc};
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use lemonlock::clock::ManualClock;
use lemonlock::models::{CachedVerdict, LicenseRecord};
use lemonlock::offline::OfflineCache;
use lemonlock::{
    Config, LicenseError, LicenseHandle, LicenseManager, LicenseStore, MemoryStore, StateStore,
};

pub const KEY: &str = "AAAAAAAA-BBBB-CCCC-DDDD-EEEEEEEEEEEE";
pub const STORE_ID: u64 = 157343;
pub const PRODUCT_ID: u64 = 463516;

pub const VALIDATE_PATH: &str = "/v1/licenses/validate";
pub const ACTIVATE_PATH: &str = "/v1/licenses/activate";
pub const DEACTIVATE_PATH: &str = "/v1/licenses/deactivate";

/// Config pointed at a mock server, with fast retries and a 1s request timeout.
pub fn test_config(base_url: &str) -> Config {
    let mut config = Config::default();
    config.retry_delay_ms = 10;
    config.authority.api_base_url = base_url.to_string();
    config.authority.request_timeout_secs = 1;
    config
}

pub struct Harness {
    pub server: MockServer,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub handle: LicenseHandle,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Start a mock authority and build a manager around it.
    pub async fn with_config(customize: impl FnOnce(&mut Config)) -> Self {
        let server = MockServer::start().await;
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(fixed_start()));
        let mut config = test_config(&server.uri());
        customize(&mut config);
        let handle = LicenseManager::init_with_clock(config, store.clone(), clock.clone()).unwrap();
        Self {
            server,
            store,
            clock,
            handle,
        }
    }

    /// Same store and clock, fresh manager: what a process restart looks like.
    pub fn restart(&self) -> LicenseHandle {
        self.restart_with(test_config(&self.server.uri()))
    }

    pub fn restart_with(&self, config: Config) -> LicenseHandle {
        LicenseManager::init_with_clock(config, self.store.clone(), self.clock.clone()).unwrap()
    }

    pub fn typed_store(&self) -> LicenseStore {
        LicenseStore::new(self.store.clone())
    }

    /// Move past the validation rate limit.
    pub fn skip_rate_limit(&self) {
        self.clock.advance(Duration::minutes(6));
    }

    /// Mount successful validate + activate responses and activate [`KEY`].
    pub async fn activate(&self, instance_id: &str) {
        mount_json(&self.server, VALIDATE_PATH, 200, valid_body()).await;
        mount_json(&self.server, ACTIVATE_PATH, 200, activated_body(instance_id)).await;
        self.handle.activate(KEY).await.unwrap();
        self.server.reset().await;
    }

    /// Requests the mock server has received for `endpoint`.
    pub async fn requests_to(&self, endpoint: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == endpoint)
            .count()
    }
}

pub fn fixed_start() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

pub fn meta() -> Value {
    json!({
        "store_id": STORE_ID,
        "order_id": 2,
        "product_id": PRODUCT_ID,
        "product_name": "Premium",
        "customer_id": 4,
        "customer_name": "Test Customer",
        "customer_email": "customer@example.com"
    })
}

pub fn valid_body() -> Value {
    json!({
        "valid": true,
        "error": null,
        "license_key": {
            "id": 1,
            "status": "active",
            "key": KEY,
            "activation_limit": 3,
            "activation_usage": 1,
            "created_at": "2026-01-01T00:00:00.000000Z",
            "expires_at": null
        },
        "instance": null,
        "meta": meta()
    })
}

pub fn valid_body_for_instance(instance_id: &str) -> Value {
    let mut body = valid_body();
    body["instance"] = json!({
        "id": instance_id,
        "name": "lemonlock-test",
        "created_at": "2026-03-01T12:00:00.000000Z"
    });
    body
}

pub fn activated_body(instance_id: &str) -> Value {
    json!({
        "activated": true,
        "error": null,
        "license_key": {
            "id": 1,
            "status": "active",
            "key": KEY,
            "activation_limit": 3,
            "activation_usage": 2,
            "expires_at": "2027-03-01T00:00:00.000000Z"
        },
        "instance": {
            "id": instance_id,
            "name": "lemonlock-test",
            "created_at": "2026-03-01T12:00:00.000000Z"
        },
        "meta": meta()
    })
}

pub async fn mount_json(server: &MockServer, endpoint: &str, status: u16, body: Value) {
    Mock::given(method("POST"))
        .and(path(endpoint))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}

/// Responds only after the 1s client timeout has passed.
pub async fn mount_timeout(server: &MockServer, endpoint: &str) {
    Mock::given(method("POST"))
        .and(path(endpoint))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(valid_body())
                .set_delay(std::time::Duration::from_secs(3)),
        )
        .mount(server)
        .await;
}

/// Write a bound license straight into storage, validated and cached at `at`.
pub fn seed_bound_license(store: &LicenseStore, instance_id: &str, at: DateTime<Utc>) {
    store
        .save_record(&LicenseRecord {
            license_key: KEY.to_string(),
            instance_id: instance_id.to_string(),
            last_validated_at: Some(at),
            valid_until: None,
            api_data: valid_body_for_instance(instance_id),
        })
        .unwrap();

    let mut offline = OfflineCache::new(true);
    offline.cache_valid_verdict(CachedVerdict {
        is_licensed: true,
        cached_at: at,
        offline_enabled: true,
    });
    store.set_offline_mode(&offline).unwrap();
}

/// Memory store whose writes can be switched to fail, like a full disk.
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_writes: AtomicBool,
}

impl FlakyStore {
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check(&self) -> lemonlock::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(LicenseError::Storage("disk full".into()))
        } else {
            Ok(())
        }
    }
}

impl StateStore for FlakyStore {
    fn get(&self, key: &str) -> lemonlock::Result<Option<String>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> lemonlock::Result<()> {
        self.check()?;
        self.inner.set(key, value)
    }

    fn delete(&self, key: &str) -> lemonlock::Result<()> {
        self.check()?;
        self.inner.delete(key)
    }
}

/// Manager over a [`FlakyStore`] already holding a bound license.
pub async fn flaky_harness(server: &MockServer) -> (Arc<FlakyStore>, LicenseHandle) {
    let store = Arc::new(FlakyStore::default());
    let clock = Arc::new(ManualClock::new(fixed_start()));
    seed_bound_license(&LicenseStore::new(store.clone()), "i-1", fixed_start());
    let handle =
        LicenseManager::init_with_clock(test_config(&server.uri()), store.clone(), clock).unwrap();
    (store, handle)
}
