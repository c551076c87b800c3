use crate::api::AppState;
use crate::error::AppError;
use axum::extract::State;
use axum::Json;

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Ready once every stored pool has a live actor answering snapshots.
pub async fn ready(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let pools = state.orchestrator.pools().await?;
    Ok(Json(serde_json::json!({
        "status": "ready",
        "pools": pools.len(),
    })))
}
