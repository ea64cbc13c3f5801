//! Provider admission API handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

use super::ErrorResponse;
use crate::state::AppState;

/// Admission state of a provider
#[derive(Debug, Serialize)]
pub struct ProviderResponse {
    pub provider: String,
    /// Downloads currently admitted across all workers.
    pub active: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_parallel_downloads: Option<u32>,
}

/// Response for a counter reset
#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub provider: String,
    pub reset: bool,
}

fn store_unavailable(provider: &str, e: impl std::fmt::Display) -> (StatusCode, Json<ErrorResponse>) {
    error!("Coordination store failed for provider {}: {}", provider, e);
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ErrorResponse::internal(e.to_string())),
    )
}

/// Current admission counter of a provider
pub async fn get_provider(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<ProviderResponse>, (StatusCode, Json<ErrorResponse>)> {
    let status = state
        .gate()
        .status(&key)
        .await
        .map_err(|e| store_unavailable(&key, e))?;
    Ok(Json(ProviderResponse {
        max_parallel_downloads: state.providers().limit_for(&key),
        provider: status.provider,
        active: status.active,
    }))
}

/// Zero a provider's counter
pub async fn reset_provider(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<ResetResponse>, (StatusCode, Json<ErrorResponse>)> {
    let reset = state
        .gate()
        .reset(&key)
        .await
        .map_err(|e| store_unavailable(&key, e))?;
    Ok(Json(ResetResponse {
        provider: key,
        reset,
    }))
}
