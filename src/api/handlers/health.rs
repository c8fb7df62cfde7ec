use crate::AppState;
use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub storage: String,
    pub engine: String,
    pub model: String,
    pub version: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "System health status", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let storage_status = match tokio::fs::metadata(&state.config.storage_root).await {
        Ok(m) if m.is_dir() => "available",
        _ => "unavailable",
    };

    let gate = state.separation.gate();
    let engine_status = if gate.health_check().await {
        "ready"
    } else {
        "unavailable"
    };

    let status = if storage_status == "available" && engine_status == "ready" {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: status.to_string(),
        storage: storage_status.to_string(),
        engine: engine_status.to_string(),
        model: gate.engine().model_tag().to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
