use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, ResponseTemplate};

use lemonlock::storage::keys;
use lemonlock::{Clock, LicenseState, StateStore};

use crate::common::*;

#[tokio::test]
async fn test_refresh_twice_within_interval_makes_one_call() {
    let h = Harness::new().await;
    h.activate("i-1").await;
    h.skip_rate_limit();

    Mock::given(method("POST"))
        .and(path(VALIDATE_PATH))
        .and(body_string_contains("instance_id=i-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(valid_body_for_instance("i-1")))
        .expect(1)
        .mount(&h.server)
        .await;

    assert!(h.handle.refresh().await.unwrap());
    h.clock.advance(chrono::Duration::minutes(4));
    assert!(h.handle.refresh().await.unwrap());
    assert!(h.handle.on_foreground().await.unwrap());

    assert_eq!(h.requests_to(VALIDATE_PATH).await, 1);
}

#[tokio::test]
async fn test_refresh_right_after_activation_is_skipped() {
    let h = Harness::new().await;
    h.activate("i-1").await;

    assert!(h.handle.refresh().await.unwrap());
    assert_eq!(h.requests_to(VALIDATE_PATH).await, 0);
}

#[tokio::test]
async fn test_refresh_after_interval_checks_again() {
    let h = Harness::new().await;
    h.activate("i-1").await;
    mount_json(&h.server, VALIDATE_PATH, 200, valid_body_for_instance("i-1")).await;

    h.skip_rate_limit();
    h.handle.refresh().await.unwrap();
    h.skip_rate_limit();
    h.handle.refresh().await.unwrap();

    assert_eq!(h.requests_to(VALIDATE_PATH).await, 2);
    assert_eq!(h.handle.license_state().last_validated, Some(h.clock.now()));
}

#[tokio::test]
async fn test_refresh_not_found_clears_everything() {
    let h = Harness::new().await;
    h.activate("i-1").await;
    h.skip_rate_limit();
    mount_json(
        &h.server,
        VALIDATE_PATH,
        404,
        json!({"valid": false, "error": "license_key not found."}),
    )
    .await;

    let licensed = h.handle.refresh().await.unwrap();

    assert!(!licensed);
    assert_eq!(h.handle.state(), LicenseState::Unlicensed);
    assert!(!h.handle.is_feature_available());
    assert!(h.store.get(keys::LICENSE_KEY).unwrap().is_none());
    assert!(h.store.get(keys::INSTANCE_ID).unwrap().is_none());
    assert!(h.store.get(keys::API_DATA).unwrap().is_none());
    // Rejections are terminal: no retries
    assert_eq!(h.requests_to(VALIDATE_PATH).await, 1);
}

#[tokio::test]
async fn test_refresh_instance_removed_remotely() {
    let h = Harness::new().await;
    h.activate("i-1").await;
    h.skip_rate_limit();
    mount_json(
        &h.server,
        VALIDATE_PATH,
        200,
        json!({"valid": false, "error": "license_key instance has been deactivated.", "meta": meta()}),
    )
    .await;

    assert!(!h.handle.refresh().await.unwrap());
    assert_eq!(h.handle.state(), LicenseState::Unlicensed);
    assert!(h.typed_store().load_record().unwrap().is_none());
}

#[tokio::test]
async fn test_refresh_mismatched_product_clears_even_when_valid() {
    let h = Harness::new().await;
    h.activate("i-1").await;
    h.skip_rate_limit();
    mount_json(
        &h.server,
        VALIDATE_PATH,
        200,
        json!({"valid": true, "meta": {"store_id": STORE_ID, "product_id": 42}}),
    )
    .await;

    assert!(!h.handle.refresh().await.unwrap());
    assert!(!h.handle.is_feature_available());
    assert!(h.store.get(keys::LICENSE_KEY).unwrap().is_none());
}

#[tokio::test]
async fn test_refresh_other_instance_is_rejection() {
    let h = Harness::new().await;
    h.activate("i-1").await;
    h.skip_rate_limit();
    mount_json(&h.server, VALIDATE_PATH, 200, valid_body_for_instance("i-9")).await;

    assert!(!h.handle.refresh().await.unwrap());
    assert_eq!(h.handle.state(), LicenseState::Unlicensed);
}

#[tokio::test]
async fn test_refresh_retries_rate_limit_then_succeeds() {
    let h = Harness::new().await;
    h.activate("i-1").await;
    h.skip_rate_limit();

    Mock::given(method("POST"))
        .and(path(VALIDATE_PATH))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .mount(&h.server)
        .await;
    mount_json(&h.server, VALIDATE_PATH, 200, valid_body_for_instance("i-1")).await;

    assert!(h.handle.refresh().await.unwrap());
    assert_eq!(h.handle.state(), LicenseState::Licensed);
    assert_eq!(h.requests_to(VALIDATE_PATH).await, 3);

    let retries: Vec<_> = h
        .handle
        .error_history()
        .into_iter()
        .filter(|e| e.code == "RETRY_ERROR")
        .collect();
    assert_eq!(retries.len(), 2);
    assert!(retries.iter().all(|e| e.retryable));
}

#[tokio::test]
async fn test_refresh_without_license_is_unlicensed() {
    let h = Harness::new().await;

    assert!(!h.handle.on_startup().await.unwrap());
    assert!(h.server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_startup_restores_after_stale_grace() {
    let h = Harness::new().await;
    seed_bound_license(
        &h.typed_store(),
        "i-1",
        fixed_start() - chrono::Duration::hours(100),
    );
    let handle = h.restart();
    assert_eq!(handle.state(), LicenseState::Unlicensed);

    mount_json(&h.server, VALIDATE_PATH, 200, valid_body_for_instance("i-1")).await;
    assert!(handle.on_startup().await.unwrap());
    assert_eq!(handle.state(), LicenseState::Licensed);
}

#[tokio::test]
async fn test_refresh_storage_failure_is_recorded() {
    let server = wiremock::MockServer::start().await;
    let (store, handle) = flaky_harness(&server).await;
    mount_json(
        &server,
        VALIDATE_PATH,
        404,
        json!({"valid": false, "error": "license_key not found."}),
    )
    .await;
    store.fail_writes(true);

    let result = handle.refresh().await;

    assert!(matches!(result, Err(lemonlock::LicenseError::Storage(_))));
    // Trust is revoked in memory even though the store could not be cleared
    assert!(!handle.is_feature_available());
    assert!(
        handle
            .error_history()
            .iter()
            .any(|e| e.code == "STORAGE_ERROR")
    );
}
