//! Failure taxonomy shared by every component.
//!
//! Each module owns its own error enum; all of them map onto a
//! [`FailureKind`] so the task layer can decide between "retry later" and
//! "give up on this resource" without knowing the concrete error type.

use serde::{Deserialize, Serialize};

/// Classification of a failure, as seen by the task retry layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A provider already has as many downloads in progress as allowed.
    AdmissionDenied,
    /// Another task holds the lock on the resource (or the work directory).
    ResourceLocked,
    /// A single transfer attempt failed; the next source may work.
    TransientTransferFailure,
    /// Every source of a resource failed with transient errors.
    DownloadExhausted,
    /// Eviction cannot free enough space for the request.
    NoSpaceEvenAfterEviction,
    /// The cleanup lock could not be acquired within the retry budget.
    EvictionLockTimeout,
    /// Missing transfer strategy, missing provider settings, bad config.
    ConfigurationError,
    /// The resource is unknown to the catalog.
    NotFound,
    /// Filesystem failure while writing or scanning.
    Io,
}

impl FailureKind {
    /// Returns the string representation used in logs and metrics labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::AdmissionDenied => "admission_denied",
            FailureKind::ResourceLocked => "resource_locked",
            FailureKind::TransientTransferFailure => "transient_transfer_failure",
            FailureKind::DownloadExhausted => "download_exhausted",
            FailureKind::NoSpaceEvenAfterEviction => "no_space_even_after_eviction",
            FailureKind::EvictionLockTimeout => "eviction_lock_timeout",
            FailureKind::ConfigurationError => "configuration_error",
            FailureKind::NotFound => "not_found",
            FailureKind::Io => "io",
        }
    }

    /// Whether the caller should re-invoke the operation later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FailureKind::AdmissionDenied | FailureKind::ResourceLocked
        )
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(FailureKind::AdmissionDenied.is_retryable());
        assert!(FailureKind::ResourceLocked.is_retryable());
        assert!(!FailureKind::NoSpaceEvenAfterEviction.is_retryable());
        assert!(!FailureKind::EvictionLockTimeout.is_retryable());
        assert!(!FailureKind::ConfigurationError.is_retryable());
        assert!(!FailureKind::DownloadExhausted.is_retryable());
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_string(&FailureKind::AdmissionDenied).unwrap();
        assert_eq!(json, "\"admission_denied\"");
        assert_eq!(FailureKind::Io.to_string(), "io");
    }
}
