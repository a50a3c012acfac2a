//! Liveness probe.

use axum::Json;
use serde_json::{Value, json};

/// GET /health — always 200 while the process is up.
pub async fn check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
