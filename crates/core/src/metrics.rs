//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Resource locks (acquisitions, releases)
//! - Provider admission (grants and denials per provider)
//! - Storage eviction (runs, freed bytes, deleted candidates)
//! - Downloads and task failures

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Lock Metrics
// =============================================================================

/// Lock acquisition attempts by result.
pub static LOCK_ACQUISITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "sluice_lock_acquisitions_total",
            "Total resource lock acquisition attempts",
        ),
        &["result"], // "acquired", "held", "store_error"
    )
    .unwrap()
});

/// Lock releases by result.
pub static LOCK_RELEASES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("sluice_lock_releases_total", "Total resource lock releases"),
        &["result"], // "released", "not_held", "store_error"
    )
    .unwrap()
});

// =============================================================================
// Admission Metrics
// =============================================================================

/// Admission decisions by provider and result.
pub static ADMISSION_DECISIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "sluice_admission_decisions_total",
            "Provider admission decisions",
        ),
        &["provider", "result"], // "granted", "denied", "unlimited", "store_error"
    )
    .unwrap()
});

// =============================================================================
// Eviction Metrics
// =============================================================================

/// Eviction passes by outcome.
pub static EVICTION_RUNS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("sluice_eviction_runs_total", "Storage eviction passes"),
        &["outcome"], // "not_needed", "evicted", "failed"
    )
    .unwrap()
});

/// Bytes freed by eviction.
pub static EVICTION_FREED_BYTES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "sluice_eviction_freed_bytes_total",
        "Total bytes freed by storage eviction",
    )
    .unwrap()
});

/// Candidates deleted by eviction or expiry.
pub static EVICTION_DELETED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "sluice_eviction_deleted_total",
            "Files and leaf directories deleted from storage",
        ),
        &["reason"], // "space", "expired", "purge"
    )
    .unwrap()
});

// =============================================================================
// Download Metrics
// =============================================================================

/// Downloads by outcome.
pub static DOWNLOADS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("sluice_downloads_total", "Download attempts by outcome"),
        &["outcome"], // "downloaded", "reused", "denied", "exhausted", "fatal"
    )
    .unwrap()
});

/// Source failures that moved the orchestrator on to the next source.
pub static SOURCE_FAILOVERS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "sluice_source_failovers_total",
        "Transient transfer failures followed by a try on the next source",
    )
    .unwrap()
});

/// Transfer duration in seconds.
pub static TRANSFER_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "sluice_transfer_duration_seconds",
            "Duration of a single source transfer",
        )
        .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0, 900.0, 3600.0]),
        &["service", "result"],
    )
    .unwrap()
});

// =============================================================================
// Task Metrics
// =============================================================================

/// Task failures by failure kind.
pub static TASK_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("sluice_task_failures_total", "Task failures by kind"),
        &["kind"],
    )
    .unwrap()
});

/// Task retries by failure kind.
pub static TASK_RETRIES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("sluice_task_retries_total", "Task retries by kind"),
        &["kind"],
    )
    .unwrap()
});

/// Returns all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Locks
        Box::new(LOCK_ACQUISITIONS.clone()),
        Box::new(LOCK_RELEASES.clone()),
        // Admission
        Box::new(ADMISSION_DECISIONS.clone()),
        // Eviction
        Box::new(EVICTION_RUNS.clone()),
        Box::new(EVICTION_FREED_BYTES.clone()),
        Box::new(EVICTION_DELETED.clone()),
        // Downloads
        Box::new(DOWNLOADS.clone()),
        Box::new(SOURCE_FAILOVERS.clone()),
        Box::new(TRANSFER_DURATION.clone()),
        // Tasks
        Box::new(TASK_FAILURES.clone()),
        Box::new(TASK_RETRIES.clone()),
    ]
}
