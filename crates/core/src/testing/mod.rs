//! Testing utilities and mock implementations.
//!
//! Mocks for the seams of the crate (coordination store, disk capacity,
//! transfer strategies and catalog), so locking, admission, eviction and
//! downloads can be tested without a shared database or a network.
//!
//! # Example
//!
//! ```rust,ignore
//! use sluice_core::testing::{FakeDiskUsage, MockTransfer, ScriptedSession};
//!
//! let usage = FakeDiskUsage::new(1_000_000, 500_000);
//! let transfer = MockTransfer::new();
//! transfer
//!     .add_session("https://a/x.nc", ScriptedSession::new("x.nc", b"data".to_vec()))
//!     .await;
//! ```

mod mock_catalog;
mod mock_disk;
mod mock_store;
mod mock_transfer;

pub use mock_catalog::MockCatalog;
pub use mock_disk::FakeDiskUsage;
pub use mock_store::FailingStore;
pub use mock_transfer::{MockFailure, MockTransfer, ScriptedSession};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::fs;
    use std::path::Path;
    use std::time::{Duration, SystemTime};

    use crate::catalog::{ResourceEntry, ResourceId, SourceCandidate};

    /// A catalog entry with the given sources, all served over HTTP.
    pub fn http_resource(id: u64, prefix: &str, uris: &[&str]) -> ResourceEntry {
        ResourceEntry {
            id: ResourceId::from(id),
            prefix: prefix.to_string(),
            sources: uris
                .iter()
                .map(|uri| SourceCandidate::new(*uri, crate::catalog::services::HTTP))
                .collect(),
        }
    }

    /// Allocation unit of the filesystem holding `path`. Eviction counts
    /// sizes in whole blocks of this size.
    pub fn block_size(path: &Path) -> u64 {
        use std::os::unix::fs::MetadataExt;
        fs::metadata(path).unwrap().blksize()
    }

    /// Write a file of `size` bytes whose mtime is `age` in the past.
    pub fn aged_file(path: &Path, size: usize, age: Duration) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, vec![0u8; size]).unwrap();
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
    }
}
