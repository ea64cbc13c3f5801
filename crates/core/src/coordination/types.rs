//! Trait and error types for coordination stores.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while talking to the coordination store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Coordination store unavailable: {0}")]
    Unavailable(String),

    #[error("Coordination store error: {0}")]
    Backend(String),

    #[error("Key {key} holds a {found}, expected a {expected}")]
    WrongType {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Counter {key} is under contention, gave up after {attempts} attempts")]
    Contention { key: String, attempts: u32 },
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// A key space shared by every worker, offering the atomic primitives that
/// locks and admission counters are built on.
///
/// Lease keys (written by [`set_if_absent`](Self::set_if_absent)) and counter
/// keys (written by [`bounded_increment`](Self::bounded_increment)) live in
/// separate namespaces of the same store.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Returns the name of this backend.
    fn name(&self) -> &str;

    /// Stores `value` under `key` with the given time-to-live, only if the
    /// key is absent or expired. Returns whether the value was stored.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration)
        -> Result<bool, StoreError>;

    /// Returns the live value stored under a lease key.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Deletes a lease key only if it still holds `value`.
    /// Returns whether something was deleted.
    async fn compare_and_delete(&self, key: &str, value: &str) -> Result<bool, StoreError>;

    /// Unconditionally deletes a key (lease or counter).
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Atomically increments the counter if it is below `limit`.
    ///
    /// Returns the new count, or `None` if the limit was already reached.
    /// A missing counter starts at zero.
    async fn bounded_increment(&self, key: &str, limit: u64) -> Result<Option<u64>, StoreError>;

    /// Decrements the counter, never going below zero. Returns the new count.
    async fn decrement(&self, key: &str) -> Result<u64, StoreError>;

    /// Returns the current value of a counter (zero if missing).
    async fn counter(&self, key: &str) -> Result<u64, StoreError>;

    /// Whether any live lease key starts with `prefix`.
    async fn has_prefix(&self, prefix: &str) -> Result<bool, StoreError>;
}
