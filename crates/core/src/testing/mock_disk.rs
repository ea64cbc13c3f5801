//! Fake filesystem capacity.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::storage::{DiskStats, DiskUsage};

/// [`DiskUsage`] reporting configurable numbers instead of asking the kernel.
///
/// Free space does not change when files are deleted; call
/// [`set_free`](Self::set_free) to simulate that.
#[derive(Debug, Clone)]
pub struct FakeDiskUsage {
    stats: Arc<RwLock<DiskStats>>,
    queried: Arc<RwLock<Vec<PathBuf>>>,
    fail: Arc<RwLock<bool>>,
}

impl FakeDiskUsage {
    pub fn new(total_bytes: u64, free_bytes: u64) -> Self {
        Self {
            stats: Arc::new(RwLock::new(DiskStats {
                total_bytes,
                free_bytes,
            })),
            queried: Arc::new(RwLock::new(Vec::new())),
            fail: Arc::new(RwLock::new(false)),
        }
    }

    pub async fn set_total(&self, total_bytes: u64) {
        self.stats.write().await.total_bytes = total_bytes;
    }

    pub async fn set_free(&self, free_bytes: u64) {
        self.stats.write().await.free_bytes = free_bytes;
    }

    /// Make every following query fail.
    pub async fn set_failing(&self, fail: bool) {
        *self.fail.write().await = fail;
    }

    /// Paths queried so far.
    pub async fn queried_paths(&self) -> Vec<PathBuf> {
        self.queried.read().await.clone()
    }
}

#[async_trait]
impl DiskUsage for FakeDiskUsage {
    async fn stats(&self, path: &Path) -> io::Result<DiskStats> {
        self.queried.write().await.push(path.to_path_buf());
        if *self.fail.read().await {
            return Err(io::Error::other("statvfs failed"));
        }
        Ok(*self.stats.read().await)
    }
}
