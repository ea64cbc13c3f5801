//! Download orchestration for one resource.
//!
//! Sources are tried in catalog order. Each attempt is admitted by the
//! provider gate, performed by the transfer strategy registered for the
//! source's service, and may evict old data to make room. Files already
//! present under the storage root are reused without any transfer.

mod orchestrator;
mod types;

pub use orchestrator::DownloadOrchestrator;
pub use types::{DownloadError, DownloadResult};
