//! Types for the download orchestrator.

use serde::Serialize;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::catalog::ResourceId;
use crate::error::FailureKind;
use crate::transfer::TransferError;

/// A file present under the storage root for a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadResult {
    pub resource_id: ResourceId,
    /// Name of the file, relative to the storage root.
    pub file_name: String,
    /// True when the file was already there and nothing was transferred.
    pub reused: bool,
}

/// Errors that can occur while downloading a resource.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Too many downloads in progress for {provider}")]
    TooManyDownloads { provider: String },

    #[error("No transfer strategy registered for the {service} service")]
    NoStrategy { service: String },

    #[error("Invalid file prefix {prefix:?}")]
    InvalidPrefix { prefix: String },

    #[error("Download of resource {resource} from {uri} failed: {source}")]
    Fatal {
        resource: ResourceId,
        uri: String,
        #[source]
        source: TransferError,
    },

    #[error("Failed to download resource {resource}: {}", describe_errors(.errors))]
    Exhausted {
        resource: ResourceId,
        errors: Vec<TransferError>,
    },

    #[error("Storage error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn describe_errors(errors: &[TransferError]) -> String {
    if errors.is_empty() {
        return "no source available".to_string();
    }
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl DownloadError {
    pub fn kind(&self) -> FailureKind {
        match self {
            DownloadError::TooManyDownloads { .. } => FailureKind::AdmissionDenied,
            DownloadError::NoStrategy { .. } | DownloadError::InvalidPrefix { .. } => {
                FailureKind::ConfigurationError
            }
            DownloadError::Fatal { source, .. } => source.kind(),
            DownloadError::Exhausted { .. } => FailureKind::DownloadExhausted,
            DownloadError::Io { .. } => FailureKind::Io,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Short label used in metrics.
    pub(crate) fn outcome(&self) -> &'static str {
        match self {
            DownloadError::TooManyDownloads { .. } => "denied",
            DownloadError::Exhausted { .. } => "exhausted",
            _ => "fatal",
        }
    }
}
