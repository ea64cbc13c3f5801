//! Filesystem capacity.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};

use super::types::DiskStats;

/// Source of total/free byte counts for the filesystem holding a path.
#[async_trait]
pub trait DiskUsage: Send + Sync {
    async fn stats(&self, path: &Path) -> io::Result<DiskStats>;
}

/// [`DiskUsage`] backed by `statvfs(3)`.
///
/// Free space is the space available to unprivileged users (`f_bavail`).
#[derive(Debug, Default, Clone, Copy)]
pub struct StatvfsUsage;

impl StatvfsUsage {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DiskUsage for StatvfsUsage {
    async fn stats(&self, path: &Path) -> io::Result<DiskStats> {
        let path: PathBuf = path.to_path_buf();
        tokio::task::spawn_blocking(move || statvfs(&path))
            .await
            .map_err(io::Error::other)?
    }
}

fn statvfs(path: &Path) -> io::Result<DiskStats> {
    let stat = nix::sys::statvfs::statvfs(path).map_err(io::Error::from)?;
    let fragment = stat.fragment_size() as u64;
    Ok(DiskStats {
        total_bytes: (stat.blocks() as u64).saturating_mul(fragment),
        free_bytes: (stat.blocks_available() as u64).saturating_mul(fragment),
    })
}

/// Effective user id of this process.
pub fn current_uid() -> u32 {
    nix::unistd::geteuid().as_raw()
}
