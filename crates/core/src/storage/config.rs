use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Storage root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory under management. Downloads land here and eviction
    /// deletes from here.
    pub root: PathBuf,

    /// Wait between attempts to take the cleanup lock, in milliseconds.
    #[serde(default = "default_cleanup_retry_wait")]
    pub cleanup_retry_wait_ms: u64,

    /// Maximum retries to take the cleanup lock.
    #[serde(default = "default_cleanup_max_retries")]
    pub cleanup_max_retries: u32,

    /// Entries whose name contains one of these markers, and everything
    /// below them, are never deleted.
    #[serde(default = "default_protected_markers")]
    pub protected_markers: Vec<String>,

    /// Directories nested deeper than this are not scanned.
    #[serde(default = "default_max_scan_depth")]
    pub max_scan_depth: usize,
}

fn default_cleanup_retry_wait() -> u64 {
    20_000
}

fn default_cleanup_max_retries() -> u32 {
    30
}

fn default_protected_markers() -> Vec<String> {
    vec![".snapshot".to_string()]
}

fn default_max_scan_depth() -> usize {
    1000
}

impl StorageConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cleanup_retry_wait_ms: default_cleanup_retry_wait(),
            cleanup_max_retries: default_cleanup_max_retries(),
            protected_markers: default_protected_markers(),
            max_scan_depth: default_max_scan_depth(),
        }
    }

    pub fn with_cleanup_retry(mut self, wait: Duration, max_retries: u32) -> Self {
        self.cleanup_retry_wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX);
        self.cleanup_max_retries = max_retries;
        self
    }

    pub fn with_protected_marker(mut self, marker: impl Into<String>) -> Self {
        self.protected_markers.push(marker.into());
        self
    }

    /// Retry policy for the cleanup lock.
    pub fn cleanup_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(self.cleanup_retry_wait_ms),
            self.cleanup_max_retries,
        )
    }
}
