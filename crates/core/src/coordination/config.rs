//! Configuration for the coordination store.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which coordination backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// No shared store: every lock and admission is granted.
    #[default]
    Disabled,
    /// In-process store.
    Memory,
    /// SQLite database file reachable by every worker.
    Sqlite,
}

/// Coordination store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Database path (required when backend = "sqlite").
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// How long a worker waits on a busy database before giving up.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

fn default_busy_timeout() -> u64 {
    5000
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: None,
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}
