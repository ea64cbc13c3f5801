//! Task layer: resource locking around units of work and bounded retries.
//!
//! A task is any async closure returning `Result<T, TaskError>`. [`locked`]
//! serializes tasks touching one resource; [`run_with_retries`] re-invokes a
//! task after a retryable failure, following the [`RetryConfig`] policies.
//!
//! [`RetryConfig`]: crate::retry::RetryConfig

mod error;
mod runner;

pub use error::TaskError;
pub use runner::TaskRunner;

use std::future::Future;
use tracing::{debug, info, warn};

use crate::catalog::ResourceId;
use crate::lock::{resource_key, ResourceLock};
use crate::metrics;
use crate::retry::RetryConfig;

/// Run `work` while holding the lock of `resource`.
///
/// Returns [`TaskError::ResourceLocked`] without running anything when
/// another holder has the lock. The lock is released whatever `work` returns,
/// and also when the returned future is dropped before completing.
pub async fn locked<T, F, Fut>(
    lock: &ResourceLock,
    resource: &ResourceId,
    holder: &str,
    work: F,
) -> Result<T, TaskError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, TaskError>>,
{
    let Some(guard) = lock.try_lock(&resource_key(resource), holder).await else {
        debug!("Resource {} is locked by another task", resource);
        return Err(TaskError::ResourceLocked {
            resource: resource.clone(),
        });
    };

    let result = work().await;
    guard.release().await;
    result
}

/// Invoke `task` until it succeeds, fails with a terminal error, or runs
/// out of retries for the kind of failure it reports.
///
/// The retry count is shared by every kind: a task that was retried five
/// times because it was locked, then gets denied admission, has already
/// used five of the admission retries.
pub async fn run_with_retries<T, F, Fut>(config: &RetryConfig, mut task: F) -> Result<T, TaskError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TaskError>>,
{
    let mut retries = 0u32;
    loop {
        let error = match task().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        let kind = error.kind();
        let policy = match config.policy_for(kind) {
            Some(policy) if retries < policy.max_retries => policy,
            Some(policy) => {
                warn!(
                    "Giving up after {} retries ({} allows {}): {}",
                    retries, kind, policy.max_retries, error
                );
                metrics::TASK_FAILURES.with_label_values(&[kind.as_str()]).inc();
                return Err(error);
            }
            None => {
                metrics::TASK_FAILURES.with_label_values(&[kind.as_str()]).inc();
                return Err(error);
            }
        };

        retries += 1;
        metrics::TASK_RETRIES.with_label_values(&[kind.as_str()]).inc();
        info!(
            "Retrying in {:?} (retry {}/{}): {}",
            policy.wait, retries, policy.max_retries, error
        );
        tokio::time::sleep(policy.wait).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::MemoryStore;
    use crate::download::DownloadError;
    use crate::lock::new_holder;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn fast_retries(max_retries: u32) -> RetryConfig {
        RetryConfig {
            lock_wait_secs: 0,
            lock_max_retries: max_retries,
            admission_wait_secs: 0,
            admission_max_retries: max_retries,
        }
    }

    fn denied() -> TaskError {
        TaskError::Download(DownloadError::TooManyDownloads {
            provider: "https://a".to_string(),
        })
    }

    #[tokio::test]
    async fn test_locked_runs_and_releases() {
        let lock = ResourceLock::new(Arc::new(MemoryStore::new()), Duration::from_secs(60));
        let id = ResourceId::from(3u64);

        let value = locked(&lock, &id, "w1", || async { Ok::<_, TaskError>(42) })
            .await
            .unwrap();
        assert_eq!(value, 42);
        assert!(lock.holder(&resource_key(&id)).await.is_none());
    }

    #[tokio::test]
    async fn test_locked_refuses_when_held() {
        let lock = ResourceLock::new(Arc::new(MemoryStore::new()), Duration::from_secs(60));
        let id = ResourceId::from(3u64);
        assert!(lock.try_acquire(&resource_key(&id), "other").await);

        let ran = AtomicU32::new(0);
        let err = locked(&lock, &id, &new_holder(), || async {
            ran.fetch_add(1, Ordering::SeqCst);
            Ok::<_, TaskError>(())
        })
        .await
        .unwrap_err();

        assert!(matches!(err, TaskError::ResourceLocked { .. }));
        assert!(err.is_retryable());
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(
            lock.holder(&resource_key(&id)).await.as_deref(),
            Some("other")
        );
    }

    #[tokio::test]
    async fn test_locked_releases_after_failure() {
        let lock = ResourceLock::new(Arc::new(MemoryStore::new()), Duration::from_secs(60));
        let id = ResourceId::from(3u64);

        let result: Result<(), TaskError> = locked(&lock, &id, "w1", || async { Err(denied()) }).await;
        assert!(result.is_err());
        assert!(lock.try_acquire(&resource_key(&id), "w2").await);
    }

    #[tokio::test]
    async fn test_locked_releases_when_cancelled() {
        let lock = ResourceLock::new(Arc::new(MemoryStore::new()), Duration::from_secs(60));
        let id = ResourceId::from(3u64);

        let stalled = locked(&lock, &id, "w1", || std::future::pending::<Result<(), TaskError>>());
        let timed_out = tokio::time::timeout(Duration::from_millis(20), stalled).await;
        assert!(timed_out.is_err());

        for _ in 0..100 {
            if lock.holder(&resource_key(&id)).await.is_none() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(lock.holder(&resource_key(&id)).await.is_none());
        assert!(lock.try_acquire(&resource_key(&id), "w2").await);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = &AtomicU32::new(0);
        let value = run_with_retries(&fast_retries(5), || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(denied())
            } else {
                Ok("done")
            }
        })
        .await
        .unwrap();

        assert_eq!(value, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), TaskError> = run_with_retries(&fast_retries(2), || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(denied())
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_terminal_errors_are_not_retried() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), TaskError> = run_with_retries(&fast_retries(5), || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TaskError::Download(DownloadError::NoStrategy {
                service: "ftp".to_string(),
            }))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
