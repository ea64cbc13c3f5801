//! Mapping of task failures onto HTTP responses.

use axum::{http::StatusCode, Json};
use serde::Serialize;
use sluice_core::{FailureKind, TaskError};
use tracing::{error, warn};

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<FailureKind>,
    /// Whether the same request may succeed later.
    pub retryable: bool,
}

impl ErrorResponse {
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            kind: None,
            retryable: false,
        }
    }
}

fn status_for(kind: FailureKind) -> StatusCode {
    if kind.is_retryable() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    match kind {
        FailureKind::NotFound => StatusCode::NOT_FOUND,
        FailureKind::NoSpaceEvenAfterEviction => StatusCode::INSUFFICIENT_STORAGE,
        FailureKind::TransientTransferFailure | FailureKind::DownloadExhausted => {
            StatusCode::BAD_GATEWAY
        }
        FailureKind::EvictionLockTimeout => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Build the response for a failed task.
pub fn task_error_response(e: TaskError) -> (StatusCode, Json<ErrorResponse>) {
    let kind = e.kind();
    let status = status_for(kind);
    if status.is_server_error() && !kind.is_retryable() {
        error!("Task failed ({}): {}", kind, e);
    } else {
        warn!("Task not completed ({}): {}", kind, e);
    }
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
            kind: Some(kind),
            retryable: kind.is_retryable(),
        }),
    )
}
