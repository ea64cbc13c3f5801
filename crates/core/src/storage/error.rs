use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::error::FailureKind;

/// Errors raised while freeing or expiring storage.
#[derive(Debug, Error)]
pub enum EvictionError {
    #[error("Could not acquire cleanup lock for {root} after {attempts} attempts")]
    LockTimeout { root: PathBuf, attempts: u32 },

    #[error("Cannot free {required} bytes on a filesystem of {total} bytes")]
    ExceedsCapacity { required: u64, total: u64 },

    #[error("Cannot free enough space: {deficit} bytes needed, only {freeable} bytes removable")]
    InsufficientCandidates { deficit: u64, freeable: u64 },

    #[error("Storage {root} is in use by running tasks")]
    Busy { root: PathBuf },

    #[error("Failed to read disk usage of {path}: {source}")]
    Usage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to scan {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to delete {path}: {source}")]
    Delete {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl EvictionError {
    pub fn kind(&self) -> FailureKind {
        match self {
            EvictionError::LockTimeout { .. } => FailureKind::EvictionLockTimeout,
            EvictionError::ExceedsCapacity { .. }
            | EvictionError::InsufficientCandidates { .. } => {
                FailureKind::NoSpaceEvenAfterEviction
            }
            EvictionError::Busy { .. } => FailureKind::ResourceLocked,
            EvictionError::Usage { .. }
            | EvictionError::Scan { .. }
            | EvictionError::Delete { .. } => FailureKind::Io,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}
