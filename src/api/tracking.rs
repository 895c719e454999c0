//! Anonymous telemetry relay routes

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    routing::post,
};

use super::ApiState;
use super::error::{ApiError, api_error, bad_body};
use crate::relay::RelayTarget;

async fn relay(
    state: &ApiState,
    target: RelayTarget,
    path: &str,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(payload) = body.map_err(|e| bad_body(&e))?;
    state
        .hub
        .relay(&target, path, payload)
        .await
        .map_err(|e| api_error(&e))?;
    Ok(StatusCode::OK)
}

async fn relay_by_device(
    State(state): State<Arc<ApiState>>,
    Path((device_id, path)): Path<(String, String)>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    relay(&state, RelayTarget::Device(device_id), &path, body).await
}

async fn relay_by_key(
    State(state): State<Arc<ApiState>>,
    Path((key, path)): Path<(String, String)>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    relay(&state, RelayTarget::Key(key), &path, body).await
}

/// Build the telemetry relay router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/tracking/machines/{machine_id}/{*path}", post(relay_by_device))
        .route("/tracking/keys/{key}/{*path}", post(relay_by_key))
        .with_state(state)
}
