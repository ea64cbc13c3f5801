//! Download lifecycle integration tests.
//!
//! Several workers run download tasks at once against one storage root, one
//! coordination store and a provider with a concurrency limit.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tempfile::TempDir;

use sluice_core::{
    catalog::services,
    lock::{new_holder, resource_key},
    testing::{FakeDiskUsage, MockTransfer, ScriptedSession},
    DownloadOrchestrator, DownloadResult, MemoryStore, ProviderAdmissionGate, ProviderRegistry,
    ProviderSettings, ResourceId, ResourceLock, RetryConfig, StaticCatalog, StorageConfig,
    StorageEvictionEngine, TaskError, TaskRunner,
};

const CATALOG: &str = r#"
[[resources]]
id = "1"
prefix = "sst_1"

[[resources.sources]]
uri = "https://slow.example.org/sst_1.nc"
service = "http"

[[resources]]
id = "2"
prefix = "sst_2"

[[resources.sources]]
uri = "https://slow.example.org/sst_2.nc"
service = "http"

[[resources]]
id = "3"
prefix = "sst_3"

[[resources.sources]]
uri = "https://slow.example.org/sst_3.nc"
service = "http"
"#;

struct Worker {
    _temp: TempDir,
    root: PathBuf,
    lock: ResourceLock,
    gate: ProviderAdmissionGate,
    transfer: MockTransfer,
    runner: TaskRunner,
}

impl Worker {
    async fn new(limit: u32) -> Self {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let root = temp.path().join("working");
        let store = Arc::new(MemoryStore::new());
        let lock = ResourceLock::new(store.clone(), Duration::from_secs(60));
        let eviction = Arc::new(StorageEvictionEngine::new(
            lock.clone(),
            Arc::new(FakeDiskUsage::new(1 << 30, 1 << 30)),
            StorageConfig::new(&root),
        ));
        let providers = ProviderRegistry::default().with_provider(
            "https://slow.example.org",
            ProviderSettings::default().with_limit(limit),
        );

        let transfer = MockTransfer::new();
        transfer.set_delay(Duration::from_millis(20)).await;
        for id in 1..=3 {
            let uri = format!("https://slow.example.org/sst_{}.nc", id);
            let name = format!("sst_{}.nc", id);
            transfer
                .add_session(&uri, ScriptedSession::new(&name, vec![id as u8; 64]))
                .await;
        }

        let gate = ProviderAdmissionGate::new(store);
        let orchestrator = DownloadOrchestrator::new(
            gate.clone(),
            eviction.clone(),
            providers,
        )
        .with_strategy(services::HTTP, Arc::new(transfer.clone()));
        let catalog = StaticCatalog::from_toml_str(CATALOG).expect("Invalid catalog");

        let runner = TaskRunner::new(
            lock.clone(),
            Arc::new(orchestrator),
            eviction,
            Arc::new(catalog),
            RetryConfig::default(),
        );
        Self {
            _temp: temp,
            root,
            lock,
            gate,
            transfer,
            runner,
        }
    }
}

/// Run a download task, sleeping briefly whenever it reports a retryable
/// failure, like a task queue re-delivering it.
async fn download_until_done(runner: TaskRunner, id: u64) -> DownloadResult {
    let id = ResourceId::from(id);
    loop {
        match runner.download(&id, &new_holder()).await {
            Ok(result) => return result,
            Err(e) if e.is_retryable() => tokio::time::sleep(Duration::from_millis(2)).await,
            Err(e) => panic!("download of {} failed: {}", id, e),
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_provider_limit_bounds_concurrent_transfers() {
    let worker = Worker::new(1).await;

    let tasks = (1..=3).map(|id| tokio::spawn(download_until_done(worker.runner.clone(), id)));
    let results: Vec<DownloadResult> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.expect("task panicked"))
        .collect();

    assert_eq!(worker.transfer.max_concurrent(), 1);
    assert_eq!(worker.transfer.connect_count().await, 3);
    for (id, result) in (1..=3).zip(results) {
        assert_eq!(result.file_name, format!("sst_{}_sst_{}.nc", id, id));
        assert!(worker.root.join(&result.file_name).exists());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_higher_limit_allows_parallel_transfers() {
    let worker = Worker::new(3).await;

    let tasks = (1..=3).map(|id| tokio::spawn(download_until_done(worker.runner.clone(), id)));
    for result in join_all(tasks).await {
        result.expect("task panicked");
    }

    assert!(worker.transfer.max_concurrent() <= 3);
    assert_eq!(worker.transfer.connect_count().await, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_resource_is_downloaded_once() {
    let worker = Worker::new(5).await;

    let tasks = (0..4).map(|_| tokio::spawn(download_until_done(worker.runner.clone(), 2)));
    let results: Vec<DownloadResult> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.expect("task panicked"))
        .collect();

    assert_eq!(worker.transfer.connect_count().await, 1);
    assert_eq!(results.iter().filter(|r| !r.reused).count(), 1);
    assert!(results.iter().all(|r| r.file_name == "sst_2_sst_2.nc"));
}

#[tokio::test]
async fn test_remove_then_download_again() {
    let worker = Worker::new(1).await;
    let id = ResourceId::from(1u64);

    let first = worker.runner.download(&id, "w1").await.unwrap();
    assert!(!first.reused);
    let removed = worker.runner.remove(&id, "w1").await.unwrap();
    assert_eq!(removed, vec![first.file_name.clone()]);

    let second = worker.runner.download(&id, "w1").await.unwrap();
    assert!(!second.reused);
    assert_eq!(worker.transfer.connect_count().await, 2);
}

#[tokio::test]
async fn test_unknown_resource_is_not_retried() {
    let worker = Worker::new(1).await;

    let err = worker
        .runner
        .download_with_retries(&ResourceId::from(99u64))
        .await
        .unwrap_err();
    assert!(matches!(err, TaskError::Catalog(_)));
    assert!(!err.is_retryable());
    assert_eq!(worker.transfer.connect_count().await, 0);
}

#[tokio::test]
async fn test_cancelled_download_frees_slot_and_lock() {
    const PROVIDER: &str = "https://slow.example.org";
    let worker = Worker::new(1).await;
    worker
        .transfer
        .add_session(
            "https://slow.example.org/sst_1.nc",
            ScriptedSession::new("sst_1.nc", vec![1; 64]).stalled(),
        )
        .await;

    let id = ResourceId::from(1u64);
    let download = worker.runner.download(&id, "w1");
    assert!(tokio::time::timeout(Duration::from_millis(50), download)
        .await
        .is_err());

    let key = resource_key(&id);
    for _ in 0..100 {
        let active = worker.gate.status(PROVIDER).await.unwrap().active;
        if active == 0 && worker.lock.holder(&key).await.is_none() {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(worker.gate.status(PROVIDER).await.unwrap().active, 0);
    assert_eq!(worker.lock.holder(&key).await, None);

    let permit = worker
        .gate
        .try_acquire(PROVIDER, Some(1))
        .await
        .expect("slot of the cancelled download was given back");
    worker.gate.release(permit).await;
    assert!(!worker.root.join("sst_1_sst_1.nc").exists());
}
