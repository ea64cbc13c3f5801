//! Common test utilities for in-process API testing with mocks.
//!
//! This module provides a test fixture that builds the router around an
//! in-memory coordination store, a fake disk and a scripted transfer, so the
//! whole service can be driven without a network or a shared database.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use sluice_core::testing::{FakeDiskUsage, MockCatalog, MockTransfer};
use sluice_core::{
    load_config_from_str, CoordinationStore, DownloadOrchestrator, MemoryStore,
    ProviderAdmissionGate, ProviderRegistry, ProviderSettings, ResourceLock, StorageConfig,
    StorageEvictionEngine, TaskRunner,
};
use sluice_server::state::AppState;

/// Re-export fixtures for test convenience
pub use sluice_core::testing::fixtures;

/// Provider every fixture source lives on.
pub const PROVIDER: &str = "https://data.example.org";

/// Test fixture for API testing with mock dependencies.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_download() {
///     let fixture = TestFixture::new().await;
///     fixture.catalog.add_resource(fixtures::http_resource(1, "ds_1", &[URI])).await;
///
///     let response = fixture.post("/api/v1/resources/1/download", json!({})).await;
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Scripted transfer registered for the http service
    pub transfer: MockTransfer,
    /// Resources known to the service
    pub catalog: MockCatalog,
    /// Disk capacity seen by the eviction engine
    pub usage: FakeDiskUsage,
    /// Coordination store shared by lock and gate
    pub store: Arc<dyn CoordinationStore>,
    /// Lock over the same store, to simulate other workers
    pub lock: ResourceLock,
    /// Gate over the same store, to simulate other workers
    pub gate: ProviderAdmissionGate,
    /// Temporary storage root
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Create a fixture with a 1 MB disk and a two-download limit on
    /// [`PROVIDER`].
    pub async fn new() -> Self {
        Self::with_disk(1_000_000, 1_000_000, 2).await
    }

    /// Create a fixture with a custom disk and provider limit.
    pub async fn with_disk(total_bytes: u64, free_bytes: u64, provider_limit: u32) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path().join("storage");
        std::fs::create_dir_all(&root).expect("Failed to create storage root");

        let config = load_config_from_str(&format!(
            r#"
[coordination]
backend = "memory"

[storage]
root = {:?}

[providers."{}"]
max_parallel_downloads = {}

[providers."{}".options]
password = "secret"
"#,
            root, PROVIDER, provider_limit, PROVIDER
        ))
        .expect("Failed to parse test config");

        let store: Arc<dyn CoordinationStore> = Arc::new(MemoryStore::new());
        let lock = ResourceLock::new(Arc::clone(&store), Duration::from_secs(60));
        let gate = ProviderAdmissionGate::new(Arc::clone(&store));

        let usage = FakeDiskUsage::new(total_bytes, free_bytes);
        let eviction = Arc::new(StorageEvictionEngine::new(
            lock.clone(),
            Arc::new(usage.clone()),
            StorageConfig::new(&root).with_cleanup_retry(Duration::ZERO, 2),
        ));

        let transfer = MockTransfer::new();
        let providers = ProviderRegistry::default().with_provider(
            PROVIDER,
            ProviderSettings::default().with_limit(provider_limit),
        );
        let orchestrator = DownloadOrchestrator::new(gate.clone(), Arc::clone(&eviction), providers)
            .with_strategy("http", Arc::new(transfer.clone()));

        let catalog = MockCatalog::new();
        let runner = TaskRunner::new(
            lock.clone(),
            Arc::new(orchestrator),
            eviction,
            Arc::new(catalog.clone()),
            config.retry.clone(),
        );

        let state = Arc::new(AppState::new(config, runner));
        let router = sluice_server::api::create_router(state);

        Self {
            router,
            transfer,
            catalog,
            usage,
            store,
            lock,
            gate,
            temp_dir,
        }
    }

    /// The storage root under management.
    pub fn root(&self) -> PathBuf {
        self.temp_dir.path().join("storage")
    }

    /// Make a GET request.
    pub async fn get(&self, uri: &str) -> TestResponse {
        self.request("GET", uri, None).await
    }

    /// Make a POST request with a JSON body.
    pub async fn post(&self, uri: &str, body: Value) -> TestResponse {
        self.request("POST", uri, Some(body)).await
    }

    /// Make a DELETE request.
    pub async fn delete(&self, uri: &str) -> TestResponse {
        self.request("DELETE", uri, None).await
    }

    /// Make a GET request and return the raw body text.
    pub async fn get_text(&self, uri: &str) -> (StatusCode, String) {
        let response = self
            .router
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .expect("Request failed");
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn request(&self, method: &str, uri: &str, body: Option<Value>) -> TestResponse {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Request failed");

        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}
