//! Peer-facing routes for servers, machines, users and queues

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;

use super::ApiState;
use super::error::{ApiError, api_error, bad_body};
use crate::Error;
use crate::registry::{Device, QueueEntry};

/// Body of `POST /server/connection`
#[derive(Debug, Deserialize)]
pub struct ServerConnection {
    #[serde(default)]
    pub server: String,
}

/// Body of `POST /machines/disconnection`
#[derive(Debug, Deserialize)]
pub struct DeviceDisconnection {
    #[serde(rename = "machineID", default)]
    pub device_id: String,
}

/// Body of `POST /users/disconnection`
#[derive(Debug, Deserialize)]
pub struct UserDisconnection {
    #[serde(default)]
    pub session: String,
}

/// Body of `POST /queue/change`
#[derive(Debug, Deserialize)]
pub struct QueueChange {
    #[serde(rename = "machineID", default)]
    pub device_id: String,
    #[serde(default)]
    pub queue: Vec<QueueEntry>,
}

async fn server_connection(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<ServerConnection>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(body) = body.map_err(|e| bad_body(&e))?;
    if body.server.trim().is_empty() {
        return Err(api_error(&Error::Invalid("server is required".to_string())));
    }

    state
        .hub
        .server_connect(&body.server)
        .await
        .map_err(|e| api_error(&e))?;
    Ok(StatusCode::OK)
}

/// Serves both connection and update
async fn device_connection(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<Device>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(device) = body.map_err(|e| bad_body(&e))?;
    state
        .hub
        .device_connect(device)
        .await
        .map_err(|e| api_error(&e))?;
    Ok(StatusCode::OK)
}

async fn device_disconnection(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<DeviceDisconnection>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(body) = body.map_err(|e| bad_body(&e))?;
    state
        .hub
        .device_disconnect(&body.device_id)
        .await
        .map_err(|e| api_error(&e))?;
    Ok(StatusCode::OK)
}

async fn list_devices(State(state): State<Arc<ApiState>>) -> Json<Vec<Device>> {
    Json(state.hub.devices().await)
}

async fn get_device(
    State(state): State<Arc<ApiState>>,
    Path(device_id): Path<String>,
) -> Result<Json<Device>, ApiError> {
    state
        .hub
        .device(&device_id)
        .await
        .map(Json)
        .map_err(|e| api_error(&e))
}

async fn user_connection(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<QueueEntry>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(entry) = body.map_err(|e| bad_body(&e))?;
    state
        .hub
        .user_connect(entry)
        .await
        .map_err(|e| api_error(&e))?;
    Ok(StatusCode::OK)
}

async fn user_disconnection(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<UserDisconnection>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(body) = body.map_err(|e| bad_body(&e))?;
    state
        .hub
        .user_disconnect(&body.session)
        .await
        .map_err(|e| api_error(&e))?;
    Ok(StatusCode::OK)
}

async fn queue_change(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<QueueChange>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(body) = body.map_err(|e| bad_body(&e))?;
    state
        .hub
        .queue_replace(&body.device_id, body.queue)
        .await
        .map_err(|e| api_error(&e))?;
    Ok(StatusCode::OK)
}

/// Build the server/machine/user/queue router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/server/connection", post(server_connection))
        .route("/machines", get(list_devices))
        .route("/machines/connection", post(device_connection))
        .route("/machines/update", post(device_connection))
        .route("/machines/disconnection", post(device_disconnection))
        .route("/machines/{machine_id}", get(get_device))
        .route("/users/connection", post(user_connection))
        .route("/users/disconnection", post(user_disconnection))
        .route("/queue/change", post(queue_change))
        .with_state(state)
}
