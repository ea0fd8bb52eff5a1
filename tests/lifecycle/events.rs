use serde_json::json;
use tokio::sync::broadcast::Receiver;

use lemonlock::{LicenseEvent, LicenseState};

use crate::common::*;

fn drain(rx: &mut Receiver<LicenseEvent>) -> Vec<LicenseEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_activation_emits_state_change() {
    let h = Harness::new().await;
    let mut rx = h.handle.subscribe();

    h.activate("i-1").await;

    assert_eq!(
        drain(&mut rx),
        vec![LicenseEvent::StateChanged {
            from: LicenseState::Unlicensed,
            to: LicenseState::Licensed,
        }]
    );
}

#[tokio::test]
async fn test_rejection_emits_invalidation_sequence() {
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
    let mut rx = h.handle.subscribe();

    h.handle.refresh().await.unwrap();

    let events = drain(&mut rx);
    assert_eq!(events.len(), 3);
    assert_eq!(
        events[0],
        LicenseEvent::StateChanged {
            from: LicenseState::Licensed,
            to: LicenseState::Invalidated,
        }
    );
    assert!(matches!(
        &events[1],
        LicenseEvent::Invalidated { reason } if reason.contains("not found")
    ));
    assert_eq!(
        events[2],
        LicenseEvent::StateChanged {
            from: LicenseState::Invalidated,
            to: LicenseState::Unlicensed,
        }
    );
}

#[tokio::test]
async fn test_outage_emits_connectivity_and_grace() {
    let h = Harness::new().await;
    h.activate("i-1").await;
    h.skip_rate_limit();
    mount_json(&h.server, VALIDATE_PATH, 502, json!({})).await;
    let mut rx = h.handle.subscribe();

    h.handle.refresh().await.unwrap();

    assert_eq!(
        drain(&mut rx),
        vec![
            LicenseEvent::ConnectivityChanged { online: false },
            LicenseEvent::StateChanged {
                from: LicenseState::Licensed,
                to: LicenseState::OfflineGrace,
            },
        ]
    );
}

#[test]
fn test_event_json_shape() {
    let event = LicenseEvent::StateChanged {
        from: LicenseState::Licensed,
        to: LicenseState::OfflineGrace,
    };
    assert_eq!(
        serde_json::to_value(&event).unwrap(),
        json!({"event": "state_changed", "from": "licensed", "to": "offline_grace"})
    );
}
