//! Storage root management: disk usage, candidate scanning and eviction.

mod config;
mod error;
mod eviction;
mod scan;
mod types;
mod usage;

pub use config::StorageConfig;
pub use error::EvictionError;
pub use eviction::{select_oldest, StorageEvictionEngine};
pub use scan::{scan_candidates, ScanOptions};
pub use types::{CandidateKind, DiskStats, EvictionPlan, EvictionReport, RemovableCandidate};
pub use usage::{current_uid, DiskUsage, StatvfsUsage};
