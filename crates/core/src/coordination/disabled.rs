use async_trait::async_trait;
use std::time::Duration;

use super::types::{CoordinationStore, StoreError};

/// Store used when no coordination backend is configured.
///
/// Every lock is granted and every admission is granted; nothing is kept.
#[derive(Debug, Default)]
pub struct DisabledStore;

impl DisabledStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CoordinationStore for DisabledStore {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn set_if_absent(
        &self,
        _key: &str,
        _value: &str,
        _ttl: Duration,
    ) -> Result<bool, StoreError> {
        Ok(true)
    }

    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Ok(None)
    }

    async fn compare_and_delete(&self, _key: &str, _value: &str) -> Result<bool, StoreError> {
        Ok(true)
    }

    async fn delete(&self, _key: &str) -> Result<bool, StoreError> {
        Ok(false)
    }

    async fn bounded_increment(&self, _key: &str, _limit: u64) -> Result<Option<u64>, StoreError> {
        Ok(Some(1))
    }

    async fn decrement(&self, _key: &str) -> Result<u64, StoreError> {
        Ok(0)
    }

    async fn counter(&self, _key: &str) -> Result<u64, StoreError> {
        Ok(0)
    }

    async fn has_prefix(&self, _prefix: &str) -> Result<bool, StoreError> {
        Ok(false)
    }
}
