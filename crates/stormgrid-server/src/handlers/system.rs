//! Liveness and readiness probes.

use axum::Json;
use serde_json::{Value, json};

/// GET `/healthz`.
pub async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// GET `/readyz`.
pub async fn readyz() -> Json<Value> {
    Json(json!({ "status": "ready" }))
}

/// GET `/`.
pub async fn root() -> Json<Value> {
    Json(json!({
        "service": "Stormgrid Control Plane",
        "status": "ok",
    }))
}
