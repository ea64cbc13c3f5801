//! Coordination store that always fails.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::coordination::{CoordinationStore, StoreError};

/// A [`CoordinationStore`] whose every call fails, for exercising the
/// fail-open and fail-closed paths of its callers.
///
/// Calls fail with [`StoreError::Unavailable`] unless the store was built
/// with [`FailingStore::contended`].
#[derive(Debug, Default, Clone)]
pub struct FailingStore {
    calls: Arc<AtomicUsize>,
    contended: bool,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose calls fail with [`StoreError::Contention`].
    pub fn contended() -> Self {
        Self {
            contended: true,
            ..Self::default()
        }
    }

    /// Number of calls made against the store.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail<T>(&self) -> Result<T, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.contended {
            Err(StoreError::Contention {
                key: "contended".to_string(),
                attempts: 1,
            })
        } else {
            Err(StoreError::Unavailable("down".to_string()))
        }
    }
}

#[async_trait]
impl CoordinationStore for FailingStore {
    fn name(&self) -> &str {
        "failing"
    }

    async fn set_if_absent(
        &self,
        _key: &str,
        _value: &str,
        _ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.fail()
    }

    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        self.fail()
    }

    async fn compare_and_delete(&self, _key: &str, _value: &str) -> Result<bool, StoreError> {
        self.fail()
    }

    async fn delete(&self, _key: &str) -> Result<bool, StoreError> {
        self.fail()
    }

    async fn bounded_increment(&self, _key: &str, _limit: u64) -> Result<Option<u64>, StoreError> {
        self.fail()
    }

    async fn decrement(&self, _key: &str) -> Result<u64, StoreError> {
        self.fail()
    }

    async fn counter(&self, _key: &str) -> Result<u64, StoreError> {
        self.fail()
    }

    async fn has_prefix(&self, _prefix: &str) -> Result<bool, StoreError> {
        self.fail()
    }
}
