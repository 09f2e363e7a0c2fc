use axum::{extract::State, response::Json};
use serde_json::json;

use crate::{errors::Result, handlers::AppState};

/// Liveness probe
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is running")),
    tag = "health"
)]
pub async fn liveness() -> Result<Json<serde_json::Value>> {
    Ok(Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

pub async fn readiness(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    let db_status = match state.store.ping().await {
        Ok(()) => "healthy",
        Err(e) => {
            tracing::warn!(error = %e, "Record store is not reachable");
            "unhealthy"
        }
    };

    let overall_status = if db_status == "healthy" { "ready" } else { "not_ready" };

    Ok(Json(json!({
        "status": overall_status,
        "checks": {
            "database": db_status,
            "tracked_jobs": state.registry.len().await
        },
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}
