//! Control handoff routes

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    routing::post,
};
use serde::Serialize;

use super::ApiState;
use super::error::{ApiError, api_error, bad_body, error_response};
use crate::handoff::{ControlAction, ControlRequest, RequestOutcome};

#[derive(Debug, Serialize)]
pub struct ControlRequestResponse {
    pub outcome: RequestOutcome,
}

async fn request_control(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<ControlRequest>, JsonRejection>,
) -> Result<Json<ControlRequestResponse>, ApiError> {
    let Json(body) = body.map_err(|e| bad_body(&e))?;
    body.validate().map_err(|e| api_error(&e))?;

    let outcome = state
        .hub
        .control_request(&body.device_id, &body.session)
        .await
        .map_err(|e| api_error(&e))?;

    if outcome == RequestOutcome::ResolveUnilaterally {
        return Err((
            StatusCode::BAD_GATEWAY,
            error_response(
                "resolve_unilaterally",
                "owning server could not be reached, force control instead",
            ),
        ));
    }
    Ok(Json(ControlRequestResponse { outcome }))
}

async fn respond_control(
    State(state): State<Arc<ApiState>>,
    Path(action): Path<String>,
    body: Result<Json<ControlRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let action: ControlAction = action.parse().map_err(|e| api_error(&e))?;
    let Json(body) = body.map_err(|e| bad_body(&e))?;
    body.validate().map_err(|e| api_error(&e))?;

    state
        .hub
        .control_response(&body.device_id, &body.session, action)
        .await
        .map_err(|e| api_error(&e))?;
    Ok(StatusCode::OK)
}

async fn force_control(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<ControlRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(body) = body.map_err(|e| bad_body(&e))?;
    body.validate().map_err(|e| api_error(&e))?;

    state
        .hub
        .control_force(&body.device_id, &body.session)
        .await
        .map_err(|e| api_error(&e))?;
    Ok(StatusCode::OK)
}

/// Build the control handoff router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/control/request", post(request_control))
        .route("/control/response/{action}", post(respond_control))
        .route("/control/force", post(force_control))
        .with_state(state)
}
