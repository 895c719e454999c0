//! Shared test utilities
#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use machine_hub::api::ApiServerBuilder;
use machine_hub::peers::Peers;
use machine_hub::{Device, Hub, QueueEntry};
use tower::ServiceExt;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TEST_API_KEY: &str = "test-api-key";

/// Hub over the given peers, without a snapshot file
#[must_use]
pub fn hub_with_peers(peers: &[String]) -> Hub {
    Hub::new(Peers::new(peers), None)
}

/// Router for a hub, guarded by [`TEST_API_KEY`]
#[must_use]
pub fn test_router(hub: Hub) -> Router {
    ApiServerBuilder::new(hub, 0)
        .api_key(Some(TEST_API_KEY.to_string()))
        .build()
        .router()
}

/// Device owned by `owner`
#[must_use]
pub fn device(id: &str, owner: Option<&str>) -> Device {
    let mut device = Device::new(id);
    device.owner_peer = owner.map(String::from);
    device
}

/// Unstamped queue entry
#[must_use]
pub fn user(session: &str, peer: &str, device_id: &str) -> QueueEntry {
    QueueEntry::new(session, peer, device_id)
}

/// Sessions queued on a device, in order
pub async fn sessions(hub: &Hub, device_id: &str) -> Vec<String> {
    hub.device(device_id)
        .await
        .map(|d| d.queue.into_iter().map(|e| e.session).collect())
        .unwrap_or_default()
}

/// Send an authenticated request and return status and JSON body
pub async fn send(
    app: Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", format!("Bearer {TEST_API_KEY}"))
        .header("content-type", "application/json");
    let body = body.map_or_else(Body::empty, |b| Body::from(b.to_string()));

    let response = app.oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

/// Authenticated JSON POST
pub async fn post(app: Router, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
    send(app, "POST", uri, Some(body)).await
}

/// Mock edge server answering every hub call with 200
pub async fn mock_peer() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex("^/hub/.*"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    server
}

/// Mount a scan response on a mock peer
pub async fn mock_scan(server: &MockServer, devices: &[Device]) {
    Mock::given(method("GET"))
        .and(path("/hub/scan"))
        .respond_with(ResponseTemplate::new(200).set_body_json(devices))
        .mount(server)
        .await;
}

/// JSON bodies a mock peer received on one path
pub async fn received(server: &MockServer, request_path: &str) -> Vec<serde_json::Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.url.path() == request_path)
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}

/// Session order of the last device a mock peer received on `/hub/broadcast`
pub async fn last_broadcast(server: &MockServer) -> Option<Vec<String>> {
    let last = received(server, "/hub/broadcast").await.pop()?;
    let device: Device = serde_json::from_value(last).unwrap();
    Some(device.queue.into_iter().map(|e| e.session).collect())
}
