//! In-process coordination store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::types::{CoordinationStore, StoreError};

#[derive(Debug, Clone)]
enum Slot {
    Lease { value: String, expires_at: Instant },
    Counter(u64),
}

impl Slot {
    fn kind(&self) -> &'static str {
        match self {
            Slot::Lease { .. } => "lease",
            Slot::Counter(_) => "counter",
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        matches!(self, Slot::Lease { expires_at, .. } if *expires_at <= now)
    }
}

/// Coordination store living in the memory of one process.
///
/// Every operation runs under a single mutex, so all primitives are atomic
/// with respect to each other. Expired leases are dropped lazily.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: Mutex<HashMap<String, Slot>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys (leases and counters).
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let slots = self.slots.lock().await;
        slots.values().filter(|s| !s.is_expired(now)).count()
    }

    /// Whether the store holds no live key.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut slots = self.slots.lock().await;
        match slots.get(key) {
            Some(slot) if !slot.is_expired(now) => Ok(false),
            _ => {
                slots.insert(
                    key.to_string(),
                    Slot::Lease {
                        value: value.to_string(),
                        expires_at: now + ttl,
                    },
                );
                Ok(true)
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let slots = self.slots.lock().await;
        match slots.get(key) {
            Some(Slot::Lease { value, expires_at }) if *expires_at > now => Ok(Some(value.clone())),
            _ => Ok(None),
        }
    }

    async fn compare_and_delete(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        let mut slots = self.slots.lock().await;
        let matches = matches!(
            slots.get(key),
            Some(Slot::Lease { value: current, .. }) if current == value
        );
        if matches {
            slots.remove(key);
        }
        Ok(matches)
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut slots = self.slots.lock().await;
        Ok(slots.remove(key).is_some())
    }

    async fn bounded_increment(&self, key: &str, limit: u64) -> Result<Option<u64>, StoreError> {
        let mut slots = self.slots.lock().await;
        match slots.get_mut(key) {
            Some(Slot::Counter(count)) => {
                if *count < limit {
                    *count += 1;
                    Ok(Some(*count))
                } else {
                    Ok(None)
                }
            }
            Some(other) => Err(StoreError::WrongType {
                key: key.to_string(),
                expected: "counter",
                found: other.kind(),
            }),
            None => {
                if limit >= 1 {
                    slots.insert(key.to_string(), Slot::Counter(1));
                    Ok(Some(1))
                } else {
                    Ok(None)
                }
            }
        }
    }

    async fn decrement(&self, key: &str) -> Result<u64, StoreError> {
        let mut slots = self.slots.lock().await;
        match slots.get_mut(key) {
            Some(Slot::Counter(count)) => {
                *count = count.saturating_sub(1);
                Ok(*count)
            }
            Some(other) => Err(StoreError::WrongType {
                key: key.to_string(),
                expected: "counter",
                found: other.kind(),
            }),
            None => Ok(0),
        }
    }

    async fn counter(&self, key: &str) -> Result<u64, StoreError> {
        let slots = self.slots.lock().await;
        match slots.get(key) {
            Some(Slot::Counter(count)) => Ok(*count),
            Some(other) => Err(StoreError::WrongType {
                key: key.to_string(),
                expected: "counter",
                found: other.kind(),
            }),
            None => Ok(0),
        }
    }

    async fn has_prefix(&self, prefix: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        let slots = self.slots.lock().await;
        Ok(slots.iter().any(|(key, slot)| {
            matches!(slot, Slot::Lease { .. }) && !slot.is_expired(now) && key.starts_with(prefix)
        }))
    }
}
