//! Node fleet endpoints.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use stormgrid_cluster::registry::NodeRegistration;
use stormgrid_cluster::types::{NodeCapacity, NodeMetrics};

use crate::state::AppState;

use super::cluster_error_response;

/// Request body of POST `/api/nodes`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    /// Opaque id chosen by the node.
    pub node_id: String,

    /// Endpoint the control plane reaches the node at.
    #[serde(default)]
    pub endpoint_url: Option<String>,

    /// Declared capacity.
    #[serde(default)]
    pub capacity: Option<NodeCapacity>,
}

/// POST `/api/nodes`: register (or re-register) a node.
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Response {
    let registration = NodeRegistration {
        node_id: request.node_id,
        endpoint_url: request.endpoint_url,
        capacity: request.capacity,
    };
    match state.registry.register(registration).await {
        Ok(node) => (StatusCode::CREATED, Json(node)).into_response(),
        Err(err) => cluster_error_response(&err),
    }
}

/// Request body of PUT `/api/nodes/{id}/heartbeat`.
#[derive(Debug, Deserialize)]
pub struct HeartbeatRequest {
    /// Fresh utilization metrics.
    pub metrics: NodeMetrics,
}

/// PUT `/api/nodes/{id}/heartbeat`.
pub async fn heartbeat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<HeartbeatRequest>,
) -> Response {
    match state.registry.heartbeat(&id, request.metrics).await {
        Ok(node) => Json(node).into_response(),
        Err(err) => cluster_error_response(&err),
    }
}

/// POST `/api/nodes/{id}/drain`.
pub async fn drain(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.registry.drain(&id).await {
        Ok(node) => Json(node).into_response(),
        Err(err) => cluster_error_response(&err),
    }
}

/// DELETE `/api/nodes/{id}`.
pub async fn deregister(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    if state.registry.deregister(&id).await {
        StatusCode::NO_CONTENT.into_response()
    } else {
        cluster_error_response(&stormgrid_cluster::ClusterError::node_not_found(id))
    }
}

/// GET `/api/nodes`.
pub async fn list(State(state): State<AppState>) -> Response {
    Json(state.registry.list().await).into_response()
}
