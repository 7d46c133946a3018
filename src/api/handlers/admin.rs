use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::lifecycle_error;
use crate::api::response::{ApiError, AppJson, JSend};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupSessionRequest {
    #[serde(alias = "session_id")]
    pub session_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupSessionResponse {
    pub deleted_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResponse {
    pub outputs_deleted: u64,
    pub retention_seconds: u64,
    pub uploads_deleted: u64,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn health() -> Json<JSend<HealthResponse>> {
    JSend::success(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn cleanup_session(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<CleanupSessionRequest>,
) -> Result<Json<JSend<CleanupSessionResponse>>, ApiError> {
    if req.session_id.trim().is_empty() {
        return Err(ApiError::bad_request("No session ID provided"));
    }

    let deleted_count = state.files.clear_session(&req.session_id).await;
    Ok(JSend::success(CleanupSessionResponse { deleted_count }))
}

pub async fn cleanup(
    State(state): State<Arc<AppState>>,
) -> Result<Json<JSend<CleanupResponse>>, ApiError> {
    let retention_seconds = state.config.storage.retention_seconds;
    let stats = state
        .files
        .sweep(Duration::from_secs(retention_seconds))
        .await
        .map_err(lifecycle_error)?;

    Ok(JSend::success(CleanupResponse {
        outputs_deleted: stats.outputs,
        retention_seconds,
        uploads_deleted: stats.uploads,
    }))
}
