//! Resource download and removal API handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use sluice_core::lock::new_holder;
use sluice_core::{DownloadResult, ResourceId};
use std::sync::Arc;
use tracing::info;

use super::{task_error_response, ErrorResponse};
use crate::state::AppState;

/// Response for a resource removal
#[derive(Debug, Serialize)]
pub struct RemoveResponse {
    pub resource_id: ResourceId,
    pub removed: Vec<String>,
}

/// Download a resource into the storage root.
///
/// A single attempt: when the resource is locked or its provider is busy
/// the caller gets a retryable 503 and decides when to come back.
pub async fn download(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DownloadResult>, (StatusCode, Json<ErrorResponse>)> {
    let resource = ResourceId::new(id);
    let result = state
        .runner()
        .download(&resource, &new_holder())
        .await
        .map_err(task_error_response)?;
    info!(
        "Resource {} available as {} (reused: {})",
        resource, result.file_name, result.reused
    );
    Ok(Json(result))
}

/// Delete the stored files of a resource
pub async fn remove(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RemoveResponse>, (StatusCode, Json<ErrorResponse>)> {
    let resource = ResourceId::new(id);
    let removed = state
        .runner()
        .remove(&resource, &new_holder())
        .await
        .map_err(task_error_response)?;
    Ok(Json(RemoveResponse {
        resource_id: resource,
        removed,
    }))
}
