//! Autoscaler endpoints.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::state::AppState;

/// GET `/api/autoscaler/recommendation`.
pub async fn recommendation(State(state): State<AppState>) -> Response {
    Json(state.autoscaler.get_recommendation().await).into_response()
}

/// POST `/api/autoscaler/ack`: the fleet operator acted on the last
/// recommendation; start the cooldown.
pub async fn ack(State(state): State<AppState>) -> StatusCode {
    state.autoscaler.record_scaling_action().await;
    StatusCode::NO_CONTENT
}
