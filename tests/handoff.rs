//! Control handoff between queued users

use machine_hub::Hub;
use machine_hub::handoff::{ControlAction, RequestOutcome};
use machine_hub::peers::Peers;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;
use common::{device, last_broadcast, mock_peer, post, received, sessions, test_router, user};

/// M1 owned by `owner`, queue [u1 via owner, u2 via requester_peer]
async fn queued_pair(hub: &Hub, owner: &str, requester_peer: &str) {
    hub.device_connect(device("M1", Some(owner))).await.unwrap();
    hub.user_connect(user("u1", owner, "M1")).await.unwrap().settled().await;
    hub.user_connect(user("u2", requester_peer, "M1"))
        .await
        .unwrap()
        .settled()
        .await;
}

#[tokio::test]
async fn request_then_accept_hands_over_control() {
    let owner = mock_peer().await;
    let requester = mock_peer().await;
    let hub = Hub::new(Peers::new([owner.uri(), requester.uri()]), None);
    queued_pair(&hub, &owner.uri(), &requester.uri()).await;

    let outcome = hub.control_request("M1", "u2").await.unwrap();
    assert_eq!(outcome, RequestOutcome::Forwarded);

    let forwarded = received(&owner, "/hub/control/request").await;
    assert_eq!(forwarded.len(), 1);
    assert_eq!(forwarded[0]["session"], "u2");
    assert_eq!(forwarded[0]["server"], requester.uri());

    hub.control_response("M1", "u2", ControlAction::Accept)
        .await
        .unwrap()
        .settled()
        .await;

    assert_eq!(sessions(&hub, "M1").await, vec!["u2", "u1"]);

    // the answer goes to the requester's peer, not the owner's
    assert_eq!(received(&requester, "/hub/control/response/accept").await.len(), 1);
    assert!(received(&owner, "/hub/control/response/accept").await.is_empty());

    // the owner sees the new order
    assert_eq!(
        last_broadcast(&owner).await,
        Some(vec!["u2".to_string(), "u1".to_string()])
    );
}

#[tokio::test]
async fn reject_keeps_order() {
    let owner = mock_peer().await;
    let requester = mock_peer().await;
    let hub = Hub::new(Peers::new([owner.uri(), requester.uri()]), None);
    queued_pair(&hub, &owner.uri(), &requester.uri()).await;

    let dispatch = hub
        .control_response("M1", "u2", ControlAction::Reject)
        .await
        .unwrap();
    assert_eq!(dispatch.len(), 1);
    dispatch.settled().await;

    assert_eq!(sessions(&hub, "M1").await, vec!["u1", "u2"]);
    assert_eq!(received(&requester, "/hub/control/response/reject").await.len(), 1);
}

#[tokio::test]
async fn force_matches_accept_outcome() {
    let owner = mock_peer().await;
    let hub = Hub::new(Peers::new([owner.uri()]), None);
    queued_pair(&hub, &owner.uri(), &owner.uri()).await;

    hub.control_force("M1", "u2").await.unwrap().settled().await;

    assert_eq!(sessions(&hub, "M1").await, vec!["u2", "u1"]);
    assert!(received(&owner, "/hub/control/request").await.is_empty());
    assert!(received(&owner, "/hub/control/response/accept").await.is_empty());
}

#[tokio::test]
async fn unreachable_owner_means_resolve_unilaterally() {
    let owner = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hub/control/request"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&owner)
        .await;
    Mock::given(method("POST"))
        .and(path("/hub/broadcast"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&owner)
        .await;

    let hub = Hub::new(Peers::new([owner.uri()]), None);
    queued_pair(&hub, &owner.uri(), &owner.uri()).await;

    let outcome = hub.control_request("M1", "u2").await.unwrap();
    assert_eq!(outcome, RequestOutcome::ResolveUnilaterally);
    assert_eq!(sessions(&hub, "M1").await, vec!["u1", "u2"]);
}

#[tokio::test]
async fn resolve_unilaterally_maps_to_bad_gateway() {
    let owner = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hub/control/request"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&owner)
        .await;

    let hub = Hub::new(Peers::new([owner.uri()]), None);
    queued_pair(&hub, &owner.uri(), &owner.uri()).await;

    let (status, body) = post(
        test_router(hub),
        "/control/request",
        json!({"machineID": "M1", "session": "u2"}),
    )
    .await;
    assert_eq!(status, axum::http::StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "resolve_unilaterally");
}

#[tokio::test]
async fn active_requester_triggers_rebroadcast() {
    let owner = mock_peer().await;
    let hub = Hub::new(Peers::new([owner.uri()]), None);
    queued_pair(&hub, &owner.uri(), &owner.uri()).await;
    let before = received(&owner, "/hub/broadcast").await.len();

    let outcome = hub.control_request("M1", "u1").await.unwrap();
    assert_eq!(outcome, RequestOutcome::AlreadyActive);
    assert!(received(&owner, "/hub/control/request").await.is_empty());

    // the rebroadcast is detached; give it a moment to land
    for _ in 0..50 {
        if received(&owner, "/hub/broadcast").await.len() > before {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(received(&owner, "/hub/broadcast").await.len(), before + 1);
}

#[tokio::test]
async fn request_requires_queued_requester_and_owner() {
    let owner = mock_peer().await;
    let hub = Hub::new(Peers::new([owner.uri()]), None);
    queued_pair(&hub, &owner.uri(), &owner.uri()).await;

    assert!(matches!(
        hub.control_request("M1", "u9").await,
        Err(machine_hub::Error::NotQueued { .. })
    ));
    assert!(matches!(
        hub.control_request("M9", "u1").await,
        Err(machine_hub::Error::DeviceNotFound(_))
    ));

    hub.device_disconnect("M1").await.unwrap();
    assert!(matches!(
        hub.control_request("M1", "u2").await,
        Err(machine_hub::Error::DeviceDisconnected(_))
    ));

    // force only needs the requester to be queued
    hub.control_force("M1", "u2").await.unwrap().settled().await;
    assert_eq!(sessions(&hub, "M1").await, vec!["u2", "u1"]);
}
