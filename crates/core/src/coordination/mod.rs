//! Coordination store shared by all worker processes.
//!
//! The store offers the two atomic primitives everything else is built on:
//! set-if-absent with an expiry (locks) and increment bounded by a limit
//! (admission counters).
//!
//! # Backends
//!
//! - [`MemoryStore`]: in-process, for tests and single-process deployments
//! - [`SqliteStore`]: a SQLite database on shared storage, for many processes
//! - [`DisabledStore`]: grants everything, used when no store is configured

mod config;
mod disabled;
mod memory;
mod sqlite;
mod types;

pub use config::{CoordinationConfig, StoreBackend};
pub use disabled::DisabledStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use types::{CoordinationStore, StoreError};

use std::sync::Arc;
use std::time::Duration;

/// Factory function to create the coordination store from config.
pub fn create_store(config: &CoordinationConfig) -> Result<Arc<dyn CoordinationStore>, StoreError> {
    match config.backend {
        StoreBackend::Disabled => Ok(Arc::new(DisabledStore::new())),
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::Sqlite => {
            let path = config.path.as_ref().ok_or_else(|| {
                StoreError::Unavailable(
                    "coordination.path must be set when using the sqlite backend".to_string(),
                )
            })?;
            let store = SqliteStore::open(path, Duration::from_millis(config.busy_timeout_ms))?;
            Ok(Arc::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_store_disabled() {
        let config = CoordinationConfig::default();
        let store = create_store(&config).unwrap();
        assert_eq!(store.name(), "disabled");
    }

    #[test]
    fn test_create_store_memory() {
        let config = CoordinationConfig {
            backend: StoreBackend::Memory,
            ..Default::default()
        };
        let store = create_store(&config).unwrap();
        assert_eq!(store.name(), "memory");
    }

    #[test]
    fn test_create_store_sqlite_requires_path() {
        let config = CoordinationConfig {
            backend: StoreBackend::Sqlite,
            path: None,
            ..Default::default()
        };
        let result = create_store(&config);
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }

    #[test]
    fn test_create_store_sqlite() {
        let temp = TempDir::new().unwrap();
        let config = CoordinationConfig {
            backend: StoreBackend::Sqlite,
            path: Some(temp.path().join("coordination.db")),
            ..Default::default()
        };
        let store = create_store(&config).unwrap();
        assert_eq!(store.name(), "sqlite");
    }
}
