//! HTTP handlers for the control-plane API.

pub mod autoscaler;
pub mod nodes;
pub mod oauth;
pub mod system;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use stormgrid_cluster::ClusterError;

/// Wire error body shared by every endpoint (RFC 6749 §5.2 shape).
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Stable error code.
    pub error: String,

    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

/// Maps a cluster error onto an HTTP response.
pub fn cluster_error_response(err: &ClusterError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = ErrorBody {
        error: err.tag().to_string(),
        error_description: Some(err.to_string()),
    };
    (status, Json(body)).into_response()
}
