use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs;
use tracing::{debug, error, info, warn};

use super::types::{DownloadError, DownloadResult};
use crate::admission::ProviderAdmissionGate;
use crate::catalog::{services, ResourceId, SourceCandidate};
use crate::metrics;
use crate::provider::{provider_key, ProviderRegistry};
use crate::storage::StorageEvictionEngine;
use crate::transfer::{
    download_url, HttpTransfer, LocalTransfer, TransferError, TransferOptions, TransferStrategy,
};

/// Downloads resources into the storage root, one source at a time.
pub struct DownloadOrchestrator {
    root: PathBuf,
    gate: ProviderAdmissionGate,
    eviction: Arc<StorageEvictionEngine>,
    providers: ProviderRegistry,
    strategies: HashMap<String, Arc<dyn TransferStrategy>>,
}

impl DownloadOrchestrator {
    /// Create an orchestrator writing into the eviction engine's root.
    /// No strategy is registered yet.
    pub fn new(
        gate: ProviderAdmissionGate,
        eviction: Arc<StorageEvictionEngine>,
        providers: ProviderRegistry,
    ) -> Self {
        Self {
            root: eviction.root().to_path_buf(),
            gate,
            eviction,
            providers,
            strategies: HashMap::new(),
        }
    }

    /// Register the strategy used for sources tagged with `service`.
    pub fn with_strategy(
        mut self,
        service: impl Into<String>,
        strategy: Arc<dyn TransferStrategy>,
    ) -> Self {
        self.strategies.insert(service.into(), strategy);
        self
    }

    /// Register HTTP for the `http` and `opendap` services and local copies
    /// for the `local` service.
    pub fn with_default_strategies(self, http_timeout: Duration) -> Result<Self, TransferError> {
        let http: Arc<dyn TransferStrategy> = Arc::new(HttpTransfer::new(http_timeout)?);
        Ok(self
            .with_strategy(services::HTTP, Arc::clone(&http))
            .with_strategy(services::OPENDAP, http)
            .with_strategy(services::LOCAL, Arc::new(LocalTransfer::new())))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn gate(&self) -> &ProviderAdmissionGate {
        &self.gate
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Registered service tags, sorted.
    pub fn services(&self) -> Vec<&str> {
        let mut services: Vec<&str> = self.strategies.keys().map(String::as_str).collect();
        services.sort_unstable();
        services
    }

    /// Name of a stored entry belonging to `prefix`, if one exists.
    ///
    /// An entry belongs to the prefix when its name is the prefix itself or
    /// starts with `<prefix>_`.
    pub async fn find_existing(&self, prefix: &str) -> Result<Option<String>, DownloadError> {
        Ok(self.matching_entries(prefix).await?.into_iter().next())
    }

    /// Download a resource from the first source that works.
    ///
    /// An admission denial stops at once with a retryable error: the other
    /// sources are not tried. Transient failures move on to the next source;
    /// anything else is fatal.
    pub async fn download(
        &self,
        resource: &ResourceId,
        sources: &[SourceCandidate],
        prefix: &str,
    ) -> Result<DownloadResult, DownloadError> {
        if let Some(file_name) = self.find_existing(prefix).await? {
            debug!("Resource {} is already present as {}", resource, file_name);
            metrics::DOWNLOADS.with_label_values(&["reused"]).inc();
            return Ok(DownloadResult {
                resource_id: resource.clone(),
                file_name,
                reused: true,
            });
        }

        fs::create_dir_all(&self.root)
            .await
            .map_err(|source| DownloadError::Io {
                path: self.root.clone(),
                source,
            })?;

        let result = self.download_from_sources(resource, sources, prefix).await;
        match &result {
            Ok(downloaded) => {
                info!(
                    "Successfully downloaded resource {} to {}",
                    resource, downloaded.file_name
                );
                metrics::DOWNLOADS.with_label_values(&["downloaded"]).inc();
            }
            Err(e) => {
                if e.is_retryable() {
                    debug!("Download of resource {} postponed: {}", resource, e);
                } else {
                    error!("Download of resource {} failed ({}): {}", resource, e.kind(), e);
                }
                metrics::DOWNLOADS.with_label_values(&[e.outcome()]).inc();
            }
        }
        result
    }

    async fn download_from_sources(
        &self,
        resource: &ResourceId,
        sources: &[SourceCandidate],
        prefix: &str,
    ) -> Result<DownloadResult, DownloadError> {
        let mut errors = Vec::new();

        for source in sources {
            let provider = provider_key(&source.uri);
            let settings = self.providers.settings_for(&provider);
            if settings.is_some() {
                debug!("Loaded settings for provider {}", provider);
            }
            let limit = settings.and_then(|s| s.max_parallel_downloads);
            let options = settings.map(|s| s.options.clone()).unwrap_or_default();

            let permit = self
                .gate
                .try_acquire(&provider, limit)
                .await
                .ok_or_else(|| DownloadError::TooManyDownloads {
                    provider: provider.clone(),
                })?;
            let attempt = self.attempt(source, prefix, &options).await;
            self.gate.release(permit).await;

            match attempt {
                Ok(file_name) => {
                    return Ok(DownloadResult {
                        resource_id: resource.clone(),
                        file_name,
                        reused: false,
                    })
                }
                Err(Attempt::Transient(e)) => {
                    warn!(
                        "Failed to download resource {} from {}, another source will be tried if possible: {}",
                        resource, source.uri, e
                    );
                    metrics::SOURCE_FAILOVERS.inc();
                    errors.push(e);
                }
                Err(Attempt::Fatal(e)) => {
                    return Err(DownloadError::Fatal {
                        resource: resource.clone(),
                        uri: source.uri.clone(),
                        source: e,
                    })
                }
                Err(Attempt::Setup(e)) => return Err(e),
            }
        }

        Err(DownloadError::Exhausted {
            resource: resource.clone(),
            errors,
        })
    }

    /// One transfer from one source, with the admission slot already held.
    async fn attempt(
        &self,
        source: &SourceCandidate,
        prefix: &str,
        options: &TransferOptions,
    ) -> Result<String, Attempt> {
        let strategy = self.strategies.get(&source.service).ok_or_else(|| {
            Attempt::Setup(DownloadError::NoStrategy {
                service: source.service.clone(),
            })
        })?;

        debug!("Attempting to download from {}", source.uri);
        let started = Instant::now();
        let result = download_url(
            strategy.as_ref(),
            &source.uri,
            &self.root,
            prefix,
            options,
            &self.eviction,
        )
        .await;
        let label = if result.is_ok() { "success" } else { "failure" };
        metrics::TRANSFER_DURATION
            .with_label_values(&[source.service.as_str(), label])
            .observe(started.elapsed().as_secs_f64());

        result.map_err(|e| {
            if e.is_transient() {
                Attempt::Transient(e)
            } else {
                Attempt::Fatal(e)
            }
        })
    }

    /// Delete every stored entry belonging to `prefix`.
    ///
    /// Returns the removed names. Nothing stored is not an error.
    pub async fn remove(&self, prefix: &str) -> Result<Vec<String>, DownloadError> {
        let mut removed = Vec::new();
        for name in self.matching_entries(prefix).await? {
            let path = self.root.join(&name);
            let metadata = match fs::symlink_metadata(&path).await {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(source) => return Err(DownloadError::Io { path, source }),
            };
            let result = if metadata.is_dir() {
                fs::remove_dir_all(&path).await
            } else {
                fs::remove_file(&path).await
            };
            match result {
                Ok(()) => {
                    debug!("Removed {}", path.display());
                    removed.push(name);
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(source) => return Err(DownloadError::Io { path, source }),
            }
        }
        Ok(removed)
    }

    /// Sorted names of the root's entries belonging to `prefix`.
    async fn matching_entries(&self, prefix: &str) -> Result<Vec<String>, DownloadError> {
        if prefix.is_empty() || prefix.contains(std::path::MAIN_SEPARATOR) || prefix == ".." {
            return Err(DownloadError::InvalidPrefix {
                prefix: prefix.to_string(),
            });
        }

        let mut read_dir = match fs::read_dir(&self.root).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(DownloadError::Io {
                    path: self.root.clone(),
                    source,
                })
            }
        };

        let with_separator = format!("{}_", prefix);
        let mut names = Vec::new();
        loop {
            match read_dir.next_entry().await {
                Ok(Some(entry)) => {
                    let name = entry.file_name().to_string_lossy().into_owned();
                    if name == prefix || name.starts_with(&with_separator) {
                        names.push(name);
                    }
                }
                Ok(None) => break,
                Err(source) => {
                    return Err(DownloadError::Io {
                        path: self.root.clone(),
                        source,
                    })
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Outcome of a failed attempt on one source.
enum Attempt {
    Transient(TransferError),
    Fatal(TransferError),
    Setup(DownloadError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::MemoryStore;
    use crate::lock::ResourceLock;
    use crate::provider::ProviderSettings;
    use crate::storage::StorageConfig;
    use crate::testing::{FakeDiskUsage, MockFailure, MockTransfer, ScriptedSession};
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        root: PathBuf,
        transfer: MockTransfer,
        gate: ProviderAdmissionGate,
        orchestrator: DownloadOrchestrator,
    }

    fn fixture(providers: ProviderRegistry) -> Fixture {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("storage");
        let store = Arc::new(MemoryStore::new());
        let lock = ResourceLock::new(store.clone(), Duration::from_secs(60));
        let eviction = Arc::new(StorageEvictionEngine::new(
            lock,
            Arc::new(FakeDiskUsage::new(1_000_000, 1_000_000)),
            StorageConfig::new(&root),
        ));
        let gate = ProviderAdmissionGate::new(store);
        let transfer = MockTransfer::new();
        let orchestrator = DownloadOrchestrator::new(gate.clone(), eviction, providers)
            .with_strategy(services::HTTP, Arc::new(transfer.clone()));
        Fixture {
            _temp: temp,
            root,
            transfer,
            gate,
            orchestrator,
        }
    }

    fn http(uri: &str) -> SourceCandidate {
        SourceCandidate::new(uri, services::HTTP)
    }

    #[tokio::test]
    async fn test_download_from_first_source() {
        let f = fixture(ProviderRegistry::default());
        f.transfer
            .add_session("https://a/sst.nc", ScriptedSession::new("sst.nc", b"data".to_vec()))
            .await;

        let result = f
            .orchestrator
            .download(&ResourceId::from(1u64), &[http("https://a/sst.nc")], "ds_1")
            .await
            .unwrap();

        assert_eq!(result.file_name, "ds_1_sst.nc");
        assert!(!result.reused);
        assert_eq!(std::fs::read(f.root.join("ds_1_sst.nc")).unwrap(), b"data");
    }

    #[tokio::test]
    async fn test_second_download_reuses_file() {
        let f = fixture(ProviderRegistry::default());
        f.transfer
            .add_session("https://a/sst.nc", ScriptedSession::new("sst.nc", b"data".to_vec()))
            .await;
        let id = ResourceId::from(1u64);
        let sources = [http("https://a/sst.nc")];

        let first = f.orchestrator.download(&id, &sources, "ds_1").await.unwrap();
        let second = f.orchestrator.download(&id, &sources, "ds_1").await.unwrap();

        assert_eq!(first.file_name, second.file_name);
        assert!(second.reused);
        assert_eq!(f.transfer.connect_count().await, 1);
    }

    #[tokio::test]
    async fn test_transient_failure_moves_to_next_source() {
        let f = fixture(ProviderRegistry::default());
        f.transfer
            .add_failure("https://a/sst.nc", MockFailure::Connection)
            .await;
        f.transfer
            .add_session("https://b/sst.nc", ScriptedSession::new("sst.nc", b"data".to_vec()))
            .await;

        let result = f
            .orchestrator
            .download(
                &ResourceId::from(1u64),
                &[http("https://a/sst.nc"), http("https://b/sst.nc")],
                "ds_1",
            )
            .await
            .unwrap();

        assert_eq!(result.file_name, "ds_1_sst.nc");
        assert_eq!(
            f.transfer.connected_uris().await,
            vec!["https://a/sst.nc".to_string(), "https://b/sst.nc".to_string()]
        );
    }

    #[tokio::test]
    async fn test_every_source_failing_is_exhaustion() {
        let f = fixture(ProviderRegistry::default());
        f.transfer
            .add_failure("https://a/sst.nc", MockFailure::Timeout)
            .await;
        f.transfer
            .add_session("https://b/sst.nc", ScriptedSession::new("sst.nc", Vec::new()))
            .await;

        let err = f
            .orchestrator
            .download(
                &ResourceId::from(1u64),
                &[http("https://a/sst.nc"), http("https://b/sst.nc")],
                "ds_1",
            )
            .await
            .unwrap_err();

        match err {
            DownloadError::Exhausted { resource, errors } => {
                assert_eq!(resource, ResourceId::from(1u64));
                assert_eq!(errors.len(), 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!f.root.join("ds_1_sst.nc").exists());
    }

    #[tokio::test]
    async fn test_denied_admission_stops_without_transfer() {
        let providers = ProviderRegistry::default()
            .with_provider("https://a", ProviderSettings::default().with_limit(1));
        let f = fixture(providers);
        f.transfer
            .add_session("https://b/sst.nc", ScriptedSession::new("sst.nc", b"data".to_vec()))
            .await;

        let held = f.gate.try_acquire("https://a", Some(1)).await.unwrap();
        let err = f
            .orchestrator
            .download(
                &ResourceId::from(1u64),
                &[http("https://a/sst.nc"), http("https://b/sst.nc")],
                "ds_1",
            )
            .await
            .unwrap_err();
        f.gate.release(held).await;

        assert!(matches!(err, DownloadError::TooManyDownloads { ref provider } if provider == "https://a"));
        assert!(err.is_retryable());
        assert_eq!(f.transfer.connect_count().await, 0);
    }

    #[tokio::test]
    async fn test_slot_released_after_each_attempt() {
        let providers = ProviderRegistry::default()
            .with_provider("https://a", ProviderSettings::default().with_limit(1));
        let f = fixture(providers);
        f.transfer
            .add_failure("https://a/old.nc", MockFailure::Obsolete)
            .await;
        f.transfer
            .add_session("https://a/sst.nc", ScriptedSession::new("sst.nc", b"data".to_vec()))
            .await;

        f.orchestrator
            .download(
                &ResourceId::from(1u64),
                &[http("https://a/old.nc"), http("https://a/sst.nc")],
                "ds_1",
            )
            .await
            .unwrap();

        assert_eq!(f.gate.status("https://a").await.unwrap().active, 0);
    }

    #[tokio::test]
    async fn test_unknown_service_is_fatal_and_releases_slot() {
        let providers = ProviderRegistry::default()
            .with_provider("ftp://a", ProviderSettings::default().with_limit(1));
        let f = fixture(providers);

        let err = f
            .orchestrator
            .download(
                &ResourceId::from(1u64),
                &[SourceCandidate::new("ftp://a/sst.nc", "ftp")],
                "ds_1",
            )
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::NoStrategy { .. }));
        assert!(!err.is_retryable());
        assert_eq!(f.gate.status("ftp://a").await.unwrap().active, 0);
    }

    #[tokio::test]
    async fn test_configuration_failure_does_not_try_other_sources() {
        let f = fixture(ProviderRegistry::default());
        f.transfer
            .add_failure("https://a/sst.nc", MockFailure::MissingSettings)
            .await;
        f.transfer
            .add_session("https://b/sst.nc", ScriptedSession::new("sst.nc", b"data".to_vec()))
            .await;

        let err = f
            .orchestrator
            .download(
                &ResourceId::from(1u64),
                &[http("https://a/sst.nc"), http("https://b/sst.nc")],
                "ds_1",
            )
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::Fatal { ref uri, .. } if uri == "https://a/sst.nc"));
        assert_eq!(f.transfer.connect_count().await, 1);
    }

    #[tokio::test]
    async fn test_find_existing_matches_prefix_boundary() {
        let f = fixture(ProviderRegistry::default());
        std::fs::create_dir_all(&f.root).unwrap();
        std::fs::write(f.root.join("ds_10_sst.nc"), b"x").unwrap();
        assert_eq!(f.orchestrator.find_existing("ds_1").await.unwrap(), None);

        std::fs::write(f.root.join("ds_1"), b"x").unwrap();
        assert_eq!(
            f.orchestrator.find_existing("ds_1").await.unwrap().as_deref(),
            Some("ds_1")
        );
        assert!(matches!(
            f.orchestrator.find_existing("").await,
            Err(DownloadError::InvalidPrefix { .. })
        ));
    }

    #[tokio::test]
    async fn test_remove() {
        let f = fixture(ProviderRegistry::default());
        std::fs::create_dir_all(f.root.join("ds_1_parts")).unwrap();
        std::fs::write(f.root.join("ds_1_parts/a.nc"), b"x").unwrap();
        std::fs::write(f.root.join("ds_1_sst.nc"), b"x").unwrap();
        std::fs::write(f.root.join("ds_2_sst.nc"), b"x").unwrap();

        let removed = f.orchestrator.remove("ds_1").await.unwrap();
        assert_eq!(removed, vec!["ds_1_parts".to_string(), "ds_1_sst.nc".to_string()]);
        assert!(f.root.join("ds_2_sst.nc").exists());
        assert!(f.orchestrator.remove("ds_1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_default_strategies() {
        let f = fixture(ProviderRegistry::default());
        let orchestrator = f
            .orchestrator
            .with_default_strategies(Duration::from_secs(30))
            .unwrap();
        assert_eq!(orchestrator.services(), vec!["http", "local", "opendap"]);
    }
}
