//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the sluice server:
//! - HTTP request metrics (latency, counts, requests in flight)
//! - Storage usage of the managed root (collected dynamically)
//! - Every core metric (locks, admission, eviction, downloads, tasks)

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use regex_lite::Regex;
use tracing::warn;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "sluice_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 60.0, 600.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("sluice_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "sluice_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Storage Metrics (collected dynamically)
// =============================================================================

/// Total bytes of the filesystem holding the storage root.
pub static STORAGE_TOTAL_BYTES: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "sluice_storage_total_bytes",
        "Size of the filesystem holding the storage root",
    )
    .unwrap()
});

/// Free bytes of the filesystem holding the storage root.
pub static STORAGE_FREE_BYTES: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "sluice_storage_free_bytes",
        "Available bytes on the filesystem holding the storage root",
    )
    .unwrap()
});

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Storage
    registry
        .register(Box::new(STORAGE_TOTAL_BYTES.clone()))
        .unwrap();
    registry
        .register(Box::new(STORAGE_FREE_BYTES.clone()))
        .unwrap();

    // Core metrics (locks, admission, eviction, downloads, tasks)
    for metric in sluice_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so the storage gauges reflect the filesystem at
/// scrape time.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let eviction = state.runner().eviction();
    match eviction.disk_stats(eviction.root()).await {
        Ok(stats) => {
            STORAGE_TOTAL_BYTES.set(stats.total_bytes as i64);
            STORAGE_FREE_BYTES.set(stats.free_bytes as i64);
        }
        Err(e) => warn!("Could not read storage usage for metrics: {}", e),
    }
}

static ID_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/(resources|providers)/[^/]+").unwrap());

/// Normalize a path for metric labels (replace resource ids and provider
/// keys with placeholders).
pub fn normalize_path(path: &str) -> String {
    ID_SEGMENT.replace_all(path, "/$1/{id}").to_string()
}
