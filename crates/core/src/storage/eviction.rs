//! On-demand eviction of the oldest stored data.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::fs;
use tracing::{debug, info, warn};

use super::config::StorageConfig;
use super::error::EvictionError;
use super::scan::{scan_candidates, ScanOptions};
use super::types::{CandidateKind, DiskStats, EvictionPlan, EvictionReport, RemovableCandidate};
use super::usage::{current_uid, DiskUsage};
use crate::lock::{cleanup_key, new_holder, ResourceLock, CLEANUP_LOCK_PREFIX, RESOURCE_LOCK_PREFIX};
use crate::metrics;

/// Pick the oldest candidates until their sizes cover `deficit`.
///
/// Candidates are ordered by modification time (then path, for a stable
/// order). Nothing is selected when the whole list cannot cover the deficit.
pub fn select_oldest(
    mut candidates: Vec<RemovableCandidate>,
    deficit: u64,
) -> Result<EvictionPlan, EvictionError> {
    candidates.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));

    let mut selected = Vec::new();
    let mut planned = 0u64;
    for candidate in candidates {
        if planned >= deficit {
            break;
        }
        planned = planned.saturating_add(candidate.size_bytes);
        selected.push(candidate);
    }

    if planned < deficit {
        return Err(EvictionError::InsufficientCandidates {
            deficit,
            freeable: planned,
        });
    }
    Ok(EvictionPlan { deficit, selected })
}

/// Frees space under a storage root by deleting the least recently
/// modified files and leaf directories.
///
/// Every destructive pass runs under the root's cleanup lock, so two
/// workers never evict concurrently.
pub struct StorageEvictionEngine {
    lock: ResourceLock,
    usage: Arc<dyn DiskUsage>,
    config: StorageConfig,
}

impl StorageEvictionEngine {
    pub fn new(lock: ResourceLock, usage: Arc<dyn DiskUsage>, config: StorageConfig) -> Self {
        Self {
            lock,
            usage,
            config,
        }
    }

    /// The configured storage root.
    pub fn root(&self) -> &Path {
        &self.config.root
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            protected_markers: self.config.protected_markers.clone(),
            max_depth: self.config.max_scan_depth,
        }
    }

    /// Total and free bytes of the filesystem holding `root`.
    pub async fn disk_stats(&self, root: &Path) -> Result<DiskStats, EvictionError> {
        self.usage
            .stats(root)
            .await
            .map_err(|source| EvictionError::Usage {
                path: root.to_path_buf(),
                source,
            })
    }

    /// Make sure `required` bytes are free under `root`, deleting the
    /// oldest candidates if needed.
    ///
    /// Either enough candidates are found and all of them are deleted, or an
    /// error is returned and nothing is deleted.
    pub async fn free_space(
        &self,
        root: &Path,
        required: u64,
    ) -> Result<EvictionReport, EvictionError> {
        let result = self
            .with_cleanup_lock(root, self.free_space_locked(root, required))
            .await;

        match &result {
            Ok(report) if report.deleted.is_empty() => {
                metrics::EVICTION_RUNS.with_label_values(&["not_needed"]).inc();
            }
            Ok(report) => {
                metrics::EVICTION_RUNS.with_label_values(&["evicted"]).inc();
                metrics::EVICTION_FREED_BYTES.inc_by(report.freed_bytes);
            }
            Err(e) => {
                warn!("Failed to free {} bytes in {}: {}", required, root.display(), e);
                metrics::EVICTION_RUNS.with_label_values(&["failed"]).inc();
            }
        }
        result
    }

    async fn free_space_locked(
        &self,
        root: &Path,
        required: u64,
    ) -> Result<EvictionReport, EvictionError> {
        let stats = self.disk_stats(root).await?;
        if required > stats.total_bytes {
            return Err(EvictionError::ExceedsCapacity {
                required,
                total: stats.total_bytes,
            });
        }
        if required <= stats.free_bytes {
            debug!(
                "{} bytes requested, {} bytes already free in {}",
                required,
                stats.free_bytes,
                root.display()
            );
            return Ok(EvictionReport::default());
        }

        let plan = self.plan(root, required - stats.free_bytes).await?;
        let report = self.delete_candidates(plan.selected, "space").await?;
        info!(
            "Freed {} bytes in {} by removing {:?}",
            report.freed_bytes,
            root.display(),
            report.deleted
        );
        Ok(report)
    }

    /// Compute which candidates would be deleted to free `deficit` bytes,
    /// without deleting anything.
    pub async fn plan(&self, root: &Path, deficit: u64) -> Result<EvictionPlan, EvictionError> {
        let candidates = scan_candidates(root, &self.scan_options()).await?;
        select_oldest(candidates, deficit)
    }

    /// Delete candidates owned by this process' user and not modified for
    /// `max_age`. No free-space target is involved.
    pub async fn expire_owned(
        &self,
        root: &Path,
        max_age: Duration,
    ) -> Result<EvictionReport, EvictionError> {
        self.with_cleanup_lock(root, async {
            let cutoff = SystemTime::now()
                .checked_sub(max_age)
                .unwrap_or(SystemTime::UNIX_EPOCH);
            let uid = current_uid();

            let mut expired: Vec<RemovableCandidate> = scan_candidates(root, &self.scan_options())
                .await?
                .into_iter()
                .filter(|c| c.owner_uid == uid && c.modified < cutoff)
                .collect();
            expired.sort_by(|a, b| a.modified.cmp(&b.modified));

            let report = self.delete_candidates(expired, "expired").await?;
            if !report.deleted.is_empty() {
                info!(
                    "Removed {} entries older than {:?} from {}",
                    report.deleted.len(),
                    max_age,
                    root.display()
                );
            }
            Ok(report)
        })
        .await
    }

    /// Delete every entry of `root`, but only when no resource lock and no
    /// cleanup lock is alive anywhere. Protected entries are kept.
    pub async fn purge_workdir(&self, root: &Path) -> Result<Vec<PathBuf>, EvictionError> {
        if self.lock.any_held(RESOURCE_LOCK_PREFIX).await
            || self.lock.any_held(CLEANUP_LOCK_PREFIX).await
        {
            return Err(EvictionError::Busy {
                root: root.to_path_buf(),
            });
        }

        let Some(guard) = self.lock.try_lock(&cleanup_key(root), &new_holder()).await else {
            return Err(EvictionError::Busy {
                root: root.to_path_buf(),
            });
        };
        let result = self.purge_locked(root).await;
        guard.release().await;
        result
    }

    async fn purge_locked(&self, root: &Path) -> Result<Vec<PathBuf>, EvictionError> {
        let options = self.scan_options();
        let mut read_dir = fs::read_dir(root)
            .await
            .map_err(|source| EvictionError::Scan {
                path: root.to_path_buf(),
                source,
            })?;

        let mut deleted = Vec::new();
        loop {
            let entry = match read_dir.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(source) => {
                    return Err(EvictionError::Scan {
                        path: root.to_path_buf(),
                        source,
                    })
                }
            };
            let path = entry.path();
            if options.is_protected(&path) {
                continue;
            }
            let metadata = match fs::symlink_metadata(&path).await {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(source) => return Err(EvictionError::Delete { path, source }),
            };
            let removed = if metadata.is_dir() {
                fs::remove_dir_all(&path).await
            } else {
                fs::remove_file(&path).await
            };
            match removed {
                Ok(()) => deleted.push(path),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(source) => return Err(EvictionError::Delete { path, source }),
            }
        }

        metrics::EVICTION_DELETED
            .with_label_values(&["purge"])
            .inc_by(deleted.len() as u64);
        info!("Purged {} entries from {}", deleted.len(), root.display());
        Ok(deleted)
    }

    /// Run `work` while holding the cleanup lock of `root`.
    async fn with_cleanup_lock<T, F>(&self, root: &Path, work: F) -> Result<T, EvictionError>
    where
        F: std::future::Future<Output = Result<T, EvictionError>>,
    {
        let policy = self.config.cleanup_policy();
        let guard = self
            .lock
            .lock_with_retry(&cleanup_key(root), &new_holder(), &policy)
            .await
            .map_err(|_| EvictionError::LockTimeout {
                root: root.to_path_buf(),
                attempts: policy.max_retries.saturating_add(1),
            })?;

        let result = work.await;
        guard.release().await;
        result
    }

    async fn delete_candidates(
        &self,
        candidates: Vec<RemovableCandidate>,
        reason: &str,
    ) -> Result<EvictionReport, EvictionError> {
        let mut report = EvictionReport::default();
        for candidate in candidates {
            let removed = match candidate.kind {
                CandidateKind::File => fs::remove_file(&candidate.path).await,
                CandidateKind::LeafDirectory => fs::remove_dir_all(&candidate.path).await,
            };
            match removed {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    warn!(
                        "{} disappeared before it could be deleted",
                        candidate.path.display()
                    );
                }
                Err(source) => {
                    if !report.deleted.is_empty() {
                        warn!("Deletion stopped after removing {:?}", report.deleted);
                    }
                    return Err(EvictionError::Delete {
                        path: candidate.path,
                        source,
                    });
                }
            }
            debug!("Deleted {} ({} bytes)", candidate.path.display(), candidate.size_bytes);
            metrics::EVICTION_DELETED.with_label_values(&[reason]).inc();
            report.freed_bytes = report.freed_bytes.saturating_add(candidate.size_bytes);
            report.deleted.push(candidate.path);
        }
        Ok(report)
    }
}
