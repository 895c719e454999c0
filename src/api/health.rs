//! Health check endpoints

use axum::{Json, Router, routing::get};
use serde::Serialize;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Ping response, kept compatible with existing edge server probes
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PingResponse {
    pub message: &'static str,
    pub server_time: String,
}

/// Liveness probe - is the service running?
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn ping() -> Json<PingResponse> {
    Json(PingResponse {
        message: "I'm alive!",
        server_time: chrono::Utc::now().to_rfc3339(),
    })
}

/// Build health router (no state needed)
pub fn router() -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ping", get(ping))
}
