//! Error bodies and status mapping for the HTTP API

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use serde::Serialize;

use crate::Error;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

/// Failure returned by every handler
pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn error_response(code: &str, message: &str) -> Json<ErrorResponse> {
    Json(ErrorResponse {
        error: ErrorDetail {
            code: code.to_string(),
            message: message.to_string(),
        },
    })
}

/// Map a hub error to its status and code
///
/// Anything that is not a caller mistake is logged and reported as internal.
pub fn api_error(e: &Error) -> ApiError {
    let (status, code) = match e {
        Error::Invalid(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
        Error::DeviceNotFound(_) => (StatusCode::NOT_FOUND, "device_not_found"),
        Error::NotQueued { .. } => (StatusCode::CONFLICT, "not_queued"),
        Error::DeviceDisconnected(_) => (StatusCode::CONFLICT, "device_disconnected"),
        Error::UnknownPeer(_) => (StatusCode::SERVICE_UNAVAILABLE, "unknown_peer"),
        _ => {
            tracing::error!(error = %e, "request failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_response("internal_error", "internal error"),
            );
        }
    };

    tracing::debug!(code, error = %e, "request rejected");
    (status, error_response(code, &e.to_string()))
}

/// Map a body that failed to parse
pub fn bad_body(rejection: &JsonRejection) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        error_response("invalid_request", &rejection.body_text()),
    )
}
