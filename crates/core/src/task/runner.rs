use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::{locked, run_with_retries, TaskError};
use crate::catalog::{Catalog, ResourceId};
use crate::download::{DownloadOrchestrator, DownloadResult};
use crate::lock::{new_holder, ResourceLock};
use crate::retry::RetryConfig;
use crate::storage::{EvictionReport, StorageEvictionEngine};

/// The tasks a worker runs, wired to the shared components.
///
/// Every task touching a resource's files holds the resource lock for its
/// whole duration.
#[derive(Clone)]
pub struct TaskRunner {
    lock: ResourceLock,
    orchestrator: Arc<DownloadOrchestrator>,
    eviction: Arc<StorageEvictionEngine>,
    catalog: Arc<dyn Catalog>,
    retry: RetryConfig,
}

impl TaskRunner {
    pub fn new(
        lock: ResourceLock,
        orchestrator: Arc<DownloadOrchestrator>,
        eviction: Arc<StorageEvictionEngine>,
        catalog: Arc<dyn Catalog>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            lock,
            orchestrator,
            eviction,
            catalog,
            retry,
        }
    }

    pub fn orchestrator(&self) -> &DownloadOrchestrator {
        &self.orchestrator
    }

    pub fn eviction(&self) -> &StorageEvictionEngine {
        &self.eviction
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Download a resource once, under its lock.
    pub async fn download(
        &self,
        resource: &ResourceId,
        holder: &str,
    ) -> Result<DownloadResult, TaskError> {
        locked(&self.lock, resource, holder, || async {
            let entry = self.catalog.resource(resource).await?;
            let result = self
                .orchestrator
                .download(&entry.id, &entry.sources, &entry.prefix)
                .await?;
            Ok(result)
        })
        .await
    }

    /// Download a resource, retrying while it is locked or its provider is
    /// busy. Each attempt uses a fresh holder token.
    pub async fn download_with_retries(
        &self,
        resource: &ResourceId,
    ) -> Result<DownloadResult, TaskError> {
        run_with_retries(&self.retry, || async {
            self.download(resource, &new_holder()).await
        })
        .await
    }

    /// Delete the stored files of a resource, under its lock.
    pub async fn remove(&self, resource: &ResourceId, holder: &str) -> Result<Vec<String>, TaskError> {
        locked(&self.lock, resource, holder, || async {
            let entry = self.catalog.resource(resource).await?;
            let removed = self.orchestrator.remove(&entry.prefix).await?;
            if !removed.is_empty() {
                info!("Removed {:?} for resource {}", removed, resource);
            }
            Ok(removed)
        })
        .await
    }

    /// Make sure `required_bytes` are free in the storage root.
    pub async fn free_space(&self, required_bytes: u64) -> Result<EvictionReport, TaskError> {
        Ok(self
            .eviction
            .free_space(self.eviction.root(), required_bytes)
            .await?)
    }

    /// Delete our own entries not modified for `max_age`.
    pub async fn expire(&self, max_age: Duration) -> Result<EvictionReport, TaskError> {
        Ok(self
            .eviction
            .expire_owned(self.eviction.root(), max_age)
            .await?)
    }

    /// Empty the storage root when no task is running anywhere.
    pub async fn purge_workdir(&self) -> Result<Vec<PathBuf>, TaskError> {
        Ok(self.eviction.purge_workdir(self.eviction.root()).await?)
    }
}
