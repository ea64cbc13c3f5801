//! Storage root API handlers.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use sluice_core::{EvictionReport, TaskError};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::{task_error_response, ErrorResponse};
use crate::state::AppState;

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Usage of the storage root
#[derive(Debug, Serialize)]
pub struct StorageResponse {
    pub root: PathBuf,
    pub total_bytes: u64,
    pub free_bytes: u64,
}

/// Request body for freeing space
#[derive(Debug, Deserialize)]
pub struct FreeSpaceBody {
    pub required_bytes: u64,
}

/// Request body for expiring old entries
#[derive(Debug, Deserialize)]
pub struct ExpireBody {
    pub max_age_secs: u64,
}

/// Response for the work directory purge
#[derive(Debug, Serialize)]
pub struct PurgeResponse {
    pub deleted: Vec<PathBuf>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Total and free bytes of the storage root
pub async fn get_storage(State(state): State<Arc<AppState>>) -> ApiResult<StorageResponse> {
    let eviction = state.runner().eviction();
    let stats = eviction
        .disk_stats(eviction.root())
        .await
        .map_err(|e| task_error_response(TaskError::from(e)))?;
    Ok(Json(StorageResponse {
        root: eviction.root().to_path_buf(),
        total_bytes: stats.total_bytes,
        free_bytes: stats.free_bytes,
    }))
}

/// Evict the oldest entries until `required_bytes` are free
pub async fn free_space(
    State(state): State<Arc<AppState>>,
    Json(body): Json<FreeSpaceBody>,
) -> ApiResult<EvictionReport> {
    state
        .runner()
        .free_space(body.required_bytes)
        .await
        .map(Json)
        .map_err(task_error_response)
}

/// Delete our own entries older than `max_age_secs`
pub async fn expire(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ExpireBody>,
) -> ApiResult<EvictionReport> {
    state
        .runner()
        .expire(Duration::from_secs(body.max_age_secs))
        .await
        .map(Json)
        .map_err(task_error_response)
}

/// Empty the storage root when no task is running
pub async fn purge(State(state): State<Arc<AppState>>) -> ApiResult<PurgeResponse> {
    let deleted = state
        .runner()
        .purge_workdir()
        .await
        .map_err(task_error_response)?;
    Ok(Json(PurgeResponse { deleted }))
}
