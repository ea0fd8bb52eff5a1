use chrono::Duration;
use serde_json::json;

use lemonlock::storage::keys;
use lemonlock::{LicenseState, StateStore};

use crate::common::*;

async fn mount_unavailable(h: &Harness) {
    mount_json(&h.server, VALIDATE_PATH, 503, json!({"message": "down"})).await;
}

#[tokio::test]
async fn test_timeouts_inside_grace_keep_features() {
    let h = Harness::new().await;
    h.activate("i-1").await;
    h.clock.advance(Duration::hours(1));
    mount_timeout(&h.server, VALIDATE_PATH).await;

    let licensed = h.handle.refresh().await.unwrap();

    assert!(licensed);
    assert_eq!(h.handle.state(), LicenseState::OfflineGrace);
    assert!(h.handle.is_feature_available());
    assert!(!h.handle.is_online());
    assert_eq!(h.requests_to(VALIDATE_PATH).await, 3);
    assert_eq!(h.store.get(keys::LICENSE_KEY).unwrap().as_deref(), Some(KEY));
    assert_eq!(h.store.get(keys::INSTANCE_ID).unwrap().as_deref(), Some("i-1"));
    assert_eq!(
        h.handle.license_state().grace_remaining_secs,
        71 * 3600
    );
}

#[tokio::test]
async fn test_offline_refresh_trusts_cache_without_network() {
    let h = Harness::new().await;
    h.activate("i-1").await;
    h.skip_rate_limit();
    mount_unavailable(&h).await;
    h.handle.refresh().await.unwrap();
    assert_eq!(h.requests_to(VALIDATE_PATH).await, 3);

    h.skip_rate_limit();
    assert!(h.handle.refresh().await.unwrap());

    assert_eq!(h.handle.state(), LicenseState::OfflineGrace);
    assert_eq!(h.requests_to(VALIDATE_PATH).await, 3);
}

#[tokio::test]
async fn test_grace_window_boundary() {
    let h = Harness::new().await;
    h.activate("i-1").await;
    mount_unavailable(&h).await;

    h.clock.advance(Duration::hours(71) + Duration::minutes(54));
    assert!(h.handle.refresh().await.unwrap());
    assert_eq!(h.handle.state(), LicenseState::OfflineGrace);

    // Past the rate limit and 72h01m after the last live check
    h.clock.advance(Duration::minutes(7));
    assert!(!h.handle.refresh().await.unwrap());
    assert_eq!(h.handle.state(), LicenseState::Unlicensed);
    assert!(!h.handle.is_feature_available());
    // Outage is not a rejection: the binding survives for the next live check
    assert_eq!(h.store.get(keys::LICENSE_KEY).unwrap().as_deref(), Some(KEY));
    assert!(h.typed_store().load_record().unwrap().is_some());
}

#[tokio::test]
async fn test_recovers_once_service_is_back() {
    let h = Harness::new().await;
    h.activate("i-1").await;
    h.clock.advance(Duration::hours(80));
    mount_unavailable(&h).await;
    assert!(!h.handle.refresh().await.unwrap());

    h.server.reset().await;
    mount_json(&h.server, VALIDATE_PATH, 200, valid_body_for_instance("i-1")).await;
    h.skip_rate_limit();

    assert!(h.handle.refresh().await.unwrap());
    assert_eq!(h.handle.state(), LicenseState::Licensed);
    assert!(h.handle.is_online());
    assert_eq!(
        h.handle.license_state().grace_remaining_secs,
        72 * 3600
    );
}

#[tokio::test]
async fn test_reconnect_ping_revalidates_from_grace() {
    let h = Harness::new().await;
    h.activate("i-1").await;
    h.skip_rate_limit();
    mount_unavailable(&h).await;
    h.handle.refresh().await.unwrap();
    assert_eq!(h.handle.state(), LicenseState::OfflineGrace);

    h.server.reset().await;
    mount_json(&h.server, VALIDATE_PATH, 200, valid_body_for_instance("i-1")).await;
    h.skip_rate_limit();

    // Any HTTP answer to the ping counts as reachable
    assert!(h.handle.check_connectivity().await);
    assert_eq!(h.handle.state(), LicenseState::Licensed);
    assert_eq!(h.requests_to(VALIDATE_PATH).await, 1);
}

#[tokio::test]
async fn test_offline_disabled_keeps_current_verdict() {
    let h = Harness::with_config(|c| c.offline_mode.enabled = false).await;
    h.activate("i-1").await;
    h.clock.advance(Duration::hours(100));
    mount_unavailable(&h).await;

    assert!(h.handle.refresh().await.unwrap());
    assert_eq!(h.handle.state(), LicenseState::Licensed);
    assert!(!h.handle.is_online());
    assert!(
        h.handle
            .error_history()
            .iter()
            .any(|e| e.code == "NETWORK_ERROR")
    );
}

#[tokio::test]
async fn test_restart_after_grace_starts_unlicensed() {
    let h = Harness::new().await;
    h.activate("i-1").await;

    h.clock.advance(Duration::hours(71));
    assert_eq!(h.restart().state(), LicenseState::Licensed);

    h.clock.advance(Duration::hours(2));
    let handle = h.restart();
    assert_eq!(handle.state(), LicenseState::Unlicensed);
    assert!(!handle.is_feature_available());
    assert_eq!(handle.license_state().instance_id.as_deref(), Some("i-1"));
}

#[tokio::test]
async fn test_restart_with_offline_disabled_trusts_record() {
    let h = Harness::new().await;
    h.activate("i-1").await;
    h.clock.advance(Duration::hours(200));

    let mut config = test_config(&h.server.uri());
    config.offline_mode.enabled = false;

    assert_eq!(h.restart_with(config).state(), LicenseState::Licensed);
}

#[tokio::test]
async fn test_restart_with_expired_license_is_unlicensed() {
    let h = Harness::new().await;
    h.activate("i-1").await;
    // activated_body expires 2027-03-01
    h.clock.set(fixed_start() + Duration::days(400));

    let mut config = test_config(&h.server.uri());
    config.offline_mode.enabled = false;

    assert_eq!(h.restart_with(config).state(), LicenseState::Unlicensed);
}
