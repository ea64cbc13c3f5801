use thiserror::Error;

use crate::catalog::{CatalogError, ResourceId};
use crate::download::DownloadError;
use crate::error::FailureKind;
use crate::storage::EvictionError;

/// Errors returned by tasks.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Resource {resource} is locked by another task")]
    ResourceLocked { resource: ResourceId },

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Eviction(#[from] EvictionError),
}

impl TaskError {
    pub fn kind(&self) -> FailureKind {
        match self {
            TaskError::ResourceLocked { .. } => FailureKind::ResourceLocked,
            TaskError::Catalog(CatalogError::NotFound(_)) => FailureKind::NotFound,
            TaskError::Catalog(_) => FailureKind::ConfigurationError,
            TaskError::Download(e) => e.kind(),
            TaskError::Eviction(e) => e.kind(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_kinds() {
        let err = TaskError::from(CatalogError::NotFound(ResourceId::from(9u64)));
        assert_eq!(err.kind(), FailureKind::NotFound);
        assert_eq!(err.to_string(), "Resource not found: 9");

        let err = TaskError::from(EvictionError::Busy {
            root: PathBuf::from("/data"),
        });
        assert_eq!(err.kind(), FailureKind::ResourceLocked);
        assert!(err.is_retryable());

        let err = TaskError::from(EvictionError::LockTimeout {
            root: PathBuf::from("/data"),
            attempts: 31,
        });
        assert_eq!(err.kind(), FailureKind::EvictionLockTimeout);
        assert!(!err.is_retryable());
    }
}
