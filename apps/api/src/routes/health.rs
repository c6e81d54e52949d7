use axum::Json;
use serde_json::{json, Value};

/// GET /
/// Liveness check polled by load balancers and clients.
pub async fn liveness_handler() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

/// GET /health
/// Returns a simple status object with service version.
pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "resume-review-api"
    }))
}
