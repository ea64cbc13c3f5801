//! Per-provider admission control.
//!
//! A bounded counter per provider in the coordination store caps the number
//! of simultaneous downloads from one external endpoint, across every worker.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::coordination::{CoordinationStore, StoreError};
use crate::metrics;

/// Prefix of admission counter keys.
pub const COUNTER_PREFIX: &str = "current_downloads:";

/// Counter key for a provider.
pub fn counter_key(provider: &str) -> String {
    format!("{}{}", COUNTER_PREFIX, provider)
}

/// Proof of admission, handed back to [`ProviderAdmissionGate::release`].
///
/// A counted permit that is dropped without being released, for instance
/// because the download future was cancelled, gives its slot back from a
/// spawned task.
#[must_use = "an admission permit must be released"]
pub struct AdmissionPermit {
    provider: String,
    slot: Option<Arc<dyn CoordinationStore>>,
}

impl AdmissionPermit {
    fn uncounted(provider: &str) -> Self {
        Self {
            provider: provider.to_string(),
            slot: None,
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Whether this permit occupies a slot in the provider's counter.
    pub fn is_counted(&self) -> bool {
        self.slot.is_some()
    }
}

impl fmt::Debug for AdmissionPermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionPermit")
            .field("provider", &self.provider)
            .field("counted", &self.is_counted())
            .finish()
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        let Some(store) = self.slot.take() else {
            return;
        };
        let provider = std::mem::take(&mut self.provider);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!("Admission permit for {} dropped, releasing in background", provider);
                handle.spawn(async move {
                    release_slot(store.as_ref(), &provider).await;
                });
            }
            Err(_) => warn!(
                "Admission permit for {} dropped outside a runtime, its slot stays taken",
                provider
            ),
        }
    }
}

async fn release_slot(store: &dyn CoordinationStore, provider: &str) {
    match store.decrement(&counter_key(provider)).await {
        Ok(count) => debug!("Released download slot for {} ({} left)", provider, count),
        Err(e) => warn!("Failed to release download slot for {}: {}", provider, e),
    }
}

/// Current admission state of a provider.
#[derive(Debug, Clone, Serialize)]
pub struct AdmissionStatus {
    pub provider: String,
    pub active: u64,
}

/// Bounded semaphore per provider.
#[derive(Clone)]
pub struct ProviderAdmissionGate {
    store: Arc<dyn CoordinationStore>,
}

impl ProviderAdmissionGate {
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self { store }
    }

    /// Try to take one of the `limit` download slots of a provider.
    ///
    /// Returns `None` when the provider is at its limit or its counter stays
    /// contended. An unset or zero limit, or an unreachable store, always
    /// admits.
    pub async fn try_acquire(&self, provider: &str, limit: Option<u32>) -> Option<AdmissionPermit> {
        let limit = match limit {
            Some(limit) if limit > 0 => limit,
            _ => {
                metrics::ADMISSION_DECISIONS
                    .with_label_values(&[provider, "unlimited"])
                    .inc();
                return Some(AdmissionPermit::uncounted(provider));
            }
        };

        match self
            .store
            .bounded_increment(&counter_key(provider), u64::from(limit))
            .await
        {
            Ok(Some(count)) => {
                debug!("Admitted download from {} ({}/{})", provider, count, limit);
                metrics::ADMISSION_DECISIONS
                    .with_label_values(&[provider, "granted"])
                    .inc();
                Some(AdmissionPermit {
                    provider: provider.to_string(),
                    slot: Some(Arc::clone(&self.store)),
                })
            }
            Ok(None) => {
                debug!("Too many downloads in progress for {} (limit {})", provider, limit);
                metrics::ADMISSION_DECISIONS
                    .with_label_values(&[provider, "denied"])
                    .inc();
                None
            }
            Err(StoreError::Contention { key, attempts }) => {
                warn!(
                    "Counter {} stayed contended for {} attempts, denying {}",
                    key, attempts, provider
                );
                metrics::ADMISSION_DECISIONS
                    .with_label_values(&[provider, "contention"])
                    .inc();
                None
            }
            Err(e) => {
                warn!(
                    "Coordination store failed during admission for {}, admitting: {}",
                    provider, e
                );
                metrics::ADMISSION_DECISIONS
                    .with_label_values(&[provider, "store_error"])
                    .inc();
                Some(AdmissionPermit::uncounted(provider))
            }
        }
    }

    /// Give back a slot. The counter never goes below zero.
    pub async fn release(&self, mut permit: AdmissionPermit) {
        if let Some(store) = permit.slot.take() {
            release_slot(store.as_ref(), &permit.provider).await;
        }
    }

    /// Number of slots currently taken for a provider.
    pub async fn status(&self, provider: &str) -> Result<AdmissionStatus, StoreError> {
        let active = self.store.counter(&counter_key(provider)).await?;
        Ok(AdmissionStatus {
            provider: provider.to_string(),
            active,
        })
    }

    /// Drop a provider's counter, freeing slots leaked by crashed workers.
    pub async fn reset(&self, provider: &str) -> Result<bool, StoreError> {
        let removed = self.store.delete(&counter_key(provider)).await?;
        if removed {
            warn!("Reset download counter for {}", provider);
        }
        Ok(removed)
    }
}
