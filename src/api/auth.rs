//! API key authentication middleware

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::ApiState;
use super::error::error_response;

/// Extract API key from Authorization header
fn extract_api_key(req: &Request) -> Option<&str> {
    req.headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Middleware guarding the peer-facing routes
pub async fn require_api_key(
    State(state): State<Arc<ApiState>>,
    req: Request,
    next: Next,
) -> Response {
    // If no API key configured, allow all requests (development mode)
    let Some(expected_key) = &state.api_key else {
        tracing::warn!("API key not configured - allowing unauthenticated access");
        return next.run(req).await;
    };

    match extract_api_key(&req) {
        Some(key) if key == expected_key => next.run(req).await,
        provided => {
            if provided.is_some() {
                tracing::warn!(path = %req.uri().path(), "invalid API key provided");
            } else {
                tracing::debug!(path = %req.uri().path(), "no API key provided");
            }
            (
                StatusCode::UNAUTHORIZED,
                error_response("unauthorized", "missing or invalid API key"),
            )
                .into_response()
        }
    }
}
