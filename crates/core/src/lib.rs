pub mod admission;
pub mod catalog;
pub mod config;
pub mod coordination;
pub mod download;
pub mod error;
pub mod lock;
pub mod metrics;
pub mod provider;
pub mod retry;
pub mod storage;
pub mod task;
pub mod testing;
pub mod transfer;

pub use admission::{AdmissionPermit, AdmissionStatus, ProviderAdmissionGate};
pub use catalog::{
    Catalog, CatalogError, ResourceEntry, ResourceId, SourceCandidate, StaticCatalog,
};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use coordination::{
    create_store, CoordinationConfig, CoordinationStore, DisabledStore, MemoryStore, SqliteStore,
    StoreBackend, StoreError,
};
pub use download::{DownloadError, DownloadOrchestrator, DownloadResult};
pub use error::FailureKind;
pub use lock::{LockConfig, LockError, LockGuard, ResourceLock};
pub use provider::{provider_key, ProviderRegistry, ProviderSettings};
pub use retry::{RetryConfig, RetryPolicy};
pub use storage::{
    DiskStats, DiskUsage, EvictionError, EvictionPlan, EvictionReport, StatvfsUsage,
    StorageConfig, StorageEvictionEngine,
};
pub use task::{locked, run_with_retries, TaskError, TaskRunner};
pub use transfer::{
    HttpTransfer, LocalTransfer, TransferError, TransferSession, TransferStrategy,
};
