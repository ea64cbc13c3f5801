//! Per-resource mutual exclusion over the coordination store.
//!
//! A lock is a lease key holding the holder's token. It is taken with
//! set-if-absent-with-expiry, so a crashed holder's lock disappears after one
//! TTL, and released with compare-and-delete on the token, so a late release
//! never removes a lock that expired and was taken by someone else.

mod config;

pub use config::LockConfig;

use std::fmt::Display;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::coordination::CoordinationStore;
use crate::metrics;
use crate::retry::RetryPolicy;

/// Prefix of per-resource lock keys.
pub const RESOURCE_LOCK_PREFIX: &str = "lock-";

/// Prefix of storage cleanup lock keys.
pub const CLEANUP_LOCK_PREFIX: &str = "lock_cleanup_";

/// Lock key for a resource.
pub fn resource_key(id: impl Display) -> String {
    format!("{}{}", RESOURCE_LOCK_PREFIX, id)
}

/// Lock key guarding eviction on a storage root.
pub fn cleanup_key(root: &Path) -> String {
    format!("{}{}", CLEANUP_LOCK_PREFIX, root.display())
}

/// Generate a fresh holder token.
pub fn new_holder() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Debug, Error)]
pub enum LockError {
    #[error("Could not acquire lock {key} after {attempts} attempts")]
    Timeout { key: String, attempts: u32 },
}

/// A held lock, released by [`LockGuard::release`] or, when the guard is
/// dropped first, from a spawned task.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard {
    lock: ResourceLock,
    key: String,
    holder: String,
    held: bool,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Release the lock now. Returns whether a lock was removed.
    pub async fn release(mut self) -> bool {
        self.held = false;
        self.lock.release(&self.key, &self.holder).await
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.held {
            return;
        }
        let lock = self.lock.clone();
        let key = std::mem::take(&mut self.key);
        let holder = std::mem::take(&mut self.holder);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!("Guard of lock {} dropped, releasing in background", key);
                handle.spawn(async move {
                    lock.release(&key, &holder).await;
                });
            }
            Err(_) => warn!(
                "Guard of lock {} dropped outside a runtime, it stays held until it expires",
                key
            ),
        }
    }
}

/// Distributed lock built on [`CoordinationStore::set_if_absent`].
#[derive(Clone)]
pub struct ResourceLock {
    store: Arc<dyn CoordinationStore>,
    ttl: Duration,
}

impl ResourceLock {
    pub fn new(store: Arc<dyn CoordinationStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn from_config(store: Arc<dyn CoordinationStore>, config: &LockConfig) -> Self {
        Self::new(store, config.ttl())
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Try once to take the lock. Store failures grant the lock.
    pub async fn try_acquire(&self, key: &str, holder: &str) -> bool {
        match self.store.set_if_absent(key, holder, self.ttl).await {
            Ok(true) => {
                debug!("Acquired lock {}", key);
                metrics::LOCK_ACQUISITIONS
                    .with_label_values(&["acquired"])
                    .inc();
                true
            }
            Ok(false) => {
                debug!("Lock {} is held by another worker", key);
                metrics::LOCK_ACQUISITIONS.with_label_values(&["held"]).inc();
                false
            }
            Err(e) => {
                warn!("Coordination store failed while locking {}, proceeding unlocked: {}", key, e);
                metrics::LOCK_ACQUISITIONS
                    .with_label_values(&["store_error"])
                    .inc();
                true
            }
        }
    }

    /// Like [`try_acquire`](Self::try_acquire), returning a guard that owns
    /// the release.
    pub async fn try_lock(&self, key: &str, holder: &str) -> Option<LockGuard> {
        if self.try_acquire(key, holder).await {
            Some(self.guard(key, holder))
        } else {
            None
        }
    }

    /// Like [`acquire_with_retry`](Self::acquire_with_retry), returning a
    /// guard that owns the release.
    pub async fn lock_with_retry(
        &self,
        key: &str,
        holder: &str,
        policy: &RetryPolicy,
    ) -> Result<LockGuard, LockError> {
        self.acquire_with_retry(key, holder, policy).await?;
        Ok(self.guard(key, holder))
    }

    fn guard(&self, key: &str, holder: &str) -> LockGuard {
        LockGuard {
            lock: self.clone(),
            key: key.to_string(),
            holder: holder.to_string(),
            held: true,
        }
    }

    /// Release the lock if `holder` still owns it.
    ///
    /// Returns whether a lock was removed. Releasing a lock that expired or
    /// belongs to another holder is a no-op.
    pub async fn release(&self, key: &str, holder: &str) -> bool {
        match self.store.compare_and_delete(key, holder).await {
            Ok(true) => {
                debug!("Released lock {}", key);
                metrics::LOCK_RELEASES.with_label_values(&["released"]).inc();
                true
            }
            Ok(false) => {
                warn!("Lock {} was no longer held by {} at release", key, holder);
                metrics::LOCK_RELEASES.with_label_values(&["not_held"]).inc();
                false
            }
            Err(e) => {
                warn!("Failed to release lock {}: {}", key, e);
                metrics::LOCK_RELEASES
                    .with_label_values(&["store_error"])
                    .inc();
                false
            }
        }
    }

    /// Take the lock, sleeping `policy.wait` between attempts, for at most
    /// `policy.max_retries` retries.
    pub async fn acquire_with_retry(
        &self,
        key: &str,
        holder: &str,
        policy: &RetryPolicy,
    ) -> Result<(), LockError> {
        let attempts = policy.max_retries.saturating_add(1);
        for attempt in 1..=attempts {
            if self.try_acquire(key, holder).await {
                return Ok(());
            }
            if attempt < attempts {
                debug!(
                    "Waiting {:?} for lock {} (attempt {}/{})",
                    policy.wait, key, attempt, attempts
                );
                tokio::time::sleep(policy.wait).await;
            }
        }
        Err(LockError::Timeout {
            key: key.to_string(),
            attempts,
        })
    }

    /// Current holder of a lock, if it is alive.
    pub async fn holder(&self, key: &str) -> Option<String> {
        match self.store.get(key).await {
            Ok(holder) => holder,
            Err(e) => {
                warn!("Failed to read lock {}: {}", key, e);
                None
            }
        }
    }

    /// Whether any live lock key starts with `prefix`.
    ///
    /// Store failures are reported as held so destructive callers back off.
    pub async fn any_held(&self, prefix: &str) -> bool {
        match self.store.has_prefix(prefix).await {
            Ok(held) => held,
            Err(e) => {
                warn!("Failed to scan locks with prefix {}: {}", prefix, e);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::MemoryStore;
    use crate::testing::FailingStore;

    fn lock(ttl: Duration) -> ResourceLock {
        ResourceLock::new(Arc::new(MemoryStore::new()), ttl)
    }

    #[test]
    fn test_keys() {
        assert_eq!(resource_key(42), "lock-42");
        assert_eq!(cleanup_key(Path::new("/data")), "lock_cleanup_/data");
        assert_ne!(new_holder(), new_holder());
    }

    #[tokio::test]
    async fn test_second_holder_is_refused() {
        let lock = lock(Duration::from_secs(60));
        assert!(lock.try_acquire("lock-1", "a").await);
        assert!(!lock.try_acquire("lock-1", "b").await);
        assert_eq!(lock.holder("lock-1").await.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_release_requires_holder() {
        let lock = lock(Duration::from_secs(60));
        assert!(lock.try_acquire("lock-1", "a").await);
        assert!(!lock.release("lock-1", "b").await);
        assert!(lock.holder("lock-1").await.is_some());
        assert!(lock.release("lock-1", "a").await);
        assert!(lock.try_acquire("lock-1", "b").await);
    }

    #[tokio::test]
    async fn test_late_release_keeps_new_holder() {
        let lock = lock(Duration::from_millis(20));
        assert!(lock.try_acquire("lock-1", "a").await);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(lock.try_acquire("lock-1", "b").await);

        assert!(!lock.release("lock-1", "a").await);
        assert_eq!(lock.holder("lock-1").await.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_failed_attempt_keeps_holder_expiry() {
        let lock = lock(Duration::from_millis(60));
        assert!(lock.try_acquire("lock-1", "a").await);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!lock.try_acquire("lock-1", "b").await);

        // Still expires 60 ms after "a" took it, not after "b" asked.
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(lock.holder("lock-1").await.is_none());
        assert!(lock.try_acquire("lock-1", "c").await);
    }

    #[tokio::test]
    async fn test_acquire_with_retry_times_out() {
        let lock = lock(Duration::from_secs(60));
        assert!(lock.try_acquire("lock-1", "a").await);

        let policy = RetryPolicy::new(Duration::from_millis(1), 2);
        let err = lock
            .acquire_with_retry("lock-1", "b", &policy)
            .await
            .unwrap_err();
        match err {
            LockError::Timeout { key, attempts } => {
                assert_eq!(key, "lock-1");
                assert_eq!(attempts, 3);
            }
        }
    }

    #[tokio::test]
    async fn test_acquire_with_retry_waits_for_release() {
        let lock = lock(Duration::from_secs(60));
        assert!(lock.try_acquire("lock-1", "a").await);

        let releaser = lock.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            releaser.release("lock-1", "a").await;
        });

        let policy = RetryPolicy::new(Duration::from_millis(10), 50);
        lock.acquire_with_retry("lock-1", "b", &policy)
            .await
            .unwrap();
        assert_eq!(lock.holder("lock-1").await.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_unreachable_store_fails_open() {
        let store = FailingStore::new();
        let lock = ResourceLock::new(Arc::new(store.clone()), Duration::from_secs(60));
        assert!(lock.try_acquire("lock-1", "a").await);
        assert!(lock.try_acquire("lock-1", "b").await);
        assert!(!lock.release("lock-1", "a").await);
        assert!(lock.any_held("lock-").await);
        assert_eq!(store.call_count(), 4);
    }

    #[tokio::test]
    async fn test_guard_release() {
        let lock = lock(Duration::from_secs(60));
        let guard = lock.try_lock("lock-1", "a").await.unwrap();
        assert_eq!(guard.key(), "lock-1");
        assert!(lock.try_lock("lock-1", "b").await.is_none());

        assert!(guard.release().await);
        assert!(lock.holder("lock-1").await.is_none());
    }

    #[tokio::test]
    async fn test_dropped_guard_releases_in_background() {
        let lock = lock(Duration::from_secs(60));
        let guard = lock.try_lock("lock-1", "a").await.unwrap();
        drop(guard);

        for _ in 0..100 {
            if lock.holder("lock-1").await.is_none() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(lock.holder("lock-1").await.is_none());
        assert!(lock.try_acquire("lock-1", "b").await);
    }

    #[tokio::test]
    async fn test_dropped_guard_keeps_new_holder() {
        let lock = lock(Duration::from_millis(20));
        let guard = lock.try_lock("lock-1", "a").await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(lock.try_acquire("lock-1", "b").await);

        drop(guard);
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(lock.holder("lock-1").await.as_deref(), Some("b"));
    }
}
