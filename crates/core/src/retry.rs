//! Bounded retry policies.
//!
//! Nothing in this crate waits forever: every loop that sleeps between
//! attempts is driven by a [`RetryPolicy`] with a maximum retry count.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::FailureKind;

/// A fixed-backoff, bounded retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Time to wait between two attempts.
    pub wait: Duration,
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
}

impl RetryPolicy {
    /// Creates a new policy.
    pub fn new(wait: Duration, max_retries: u32) -> Self {
        Self { wait, max_retries }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(Duration::ZERO, 0)
    }

    /// Upper bound of the time spent waiting when every retry is used.
    pub fn max_total_wait(&self) -> Duration {
        self.wait.saturating_mul(self.max_retries)
    }
}

/// Retry policies applied by the task layer, per failure kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Wait between attempts when a resource is locked by another task.
    #[serde(default = "default_lock_wait")]
    pub lock_wait_secs: u64,

    /// Maximum retries when a resource is locked by another task.
    #[serde(default = "default_lock_retries")]
    pub lock_max_retries: u32,

    /// Wait between attempts when a provider refuses admission.
    #[serde(default = "default_admission_wait")]
    pub admission_wait_secs: u64,

    /// Maximum retries when a provider refuses admission (24h at 90s).
    #[serde(default = "default_admission_retries")]
    pub admission_max_retries: u32,
}

fn default_lock_wait() -> u64 {
    15
}

fn default_lock_retries() -> u32 {
    60
}

fn default_admission_wait() -> u64 {
    90
}

fn default_admission_retries() -> u32 {
    960
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            lock_wait_secs: default_lock_wait(),
            lock_max_retries: default_lock_retries(),
            admission_wait_secs: default_admission_wait(),
            admission_max_retries: default_admission_retries(),
        }
    }
}

impl RetryConfig {
    /// Policy used when a resource lock is held elsewhere.
    pub fn lock_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_secs(self.lock_wait_secs),
            self.lock_max_retries,
        )
    }

    /// Policy used when a provider refuses admission.
    pub fn admission_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_secs(self.admission_wait_secs),
            self.admission_max_retries,
        )
    }

    /// Returns the policy for a failure kind, or `None` if the kind is terminal.
    pub fn policy_for(&self, kind: FailureKind) -> Option<RetryPolicy> {
        match kind {
            FailureKind::ResourceLocked => Some(self.lock_policy()),
            FailureKind::AdmissionDenied => Some(self.admission_policy()),
            _ => None,
        }
    }
}
