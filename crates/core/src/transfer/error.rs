use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::error::FailureKind;
use crate::storage::EvictionError;

/// Errors raised by a single transfer attempt.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Failed to connect to {uri}: {message}")]
    Connection { uri: String, message: String },

    #[error("Request to {uri} timed out")]
    Timeout { uri: String },

    #[error("Could not download from {uri}: HTTP {status}")]
    Status { uri: String, status: u16 },

    #[error("{uri} is not downloadable ({reason})")]
    Obsolete { uri: String, reason: String },

    #[error("Getting an empty file from {uri}")]
    EmptyPayload { uri: String },

    #[error("Download from {uri} was interrupted: {message}")]
    Interrupted { uri: String, message: String },

    #[error("Could not find file name for {uri}")]
    MissingFileName { uri: String },

    #[error("Failed to read {uri}: {source}")]
    Source {
        uri: String,
        #[source]
        source: io::Error,
    },

    #[error("The following keys are missing from provider settings: {keys:?}")]
    MissingSettings { keys: Vec<String> },

    #[error("Invalid provider setting {key}: {message}")]
    InvalidSetting { key: String, message: String },

    #[error("No space left on device while writing {path}")]
    NoSpace { path: PathBuf },

    #[error("Could not write the downloaded file to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Space(#[from] EvictionError),
}

impl TransferError {
    /// Whether another source of the same resource may still succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransferError::Connection { .. }
                | TransferError::Timeout { .. }
                | TransferError::Status { .. }
                | TransferError::Obsolete { .. }
                | TransferError::EmptyPayload { .. }
                | TransferError::Interrupted { .. }
                | TransferError::MissingFileName { .. }
                | TransferError::Source { .. }
        )
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            _ if self.is_transient() => FailureKind::TransientTransferFailure,
            TransferError::MissingSettings { .. } | TransferError::InvalidSetting { .. } => {
                FailureKind::ConfigurationError
            }
            TransferError::NoSpace { .. } => FailureKind::NoSpaceEvenAfterEviction,
            TransferError::Space(e) => e.kind(),
            _ => FailureKind::Io,
        }
    }

    /// Classify an error raised while writing to `path`.
    pub fn from_write(path: PathBuf, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::StorageFull {
            TransferError::NoSpace { path }
        } else {
            TransferError::Write { path, source }
        }
    }
}
