use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::services::get_metrics;
use crate::startup::AppState;

pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "finance-service",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Ready once the document store answers. The in-memory backend always is.
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let Some(db) = &state.db else {
        return (StatusCode::OK, Json(json!({ "status": "ready", "storage": "memory" })));
    };

    match db.health_check().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ready", "storage": "mongodb" }))),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable", "error": e.to_string() })),
            )
        }
    }
}

pub async fn metrics_endpoint() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}
