use serde::Serialize;
use std::path::PathBuf;
use std::time::SystemTime;

/// What a candidate is on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateKind {
    File,
    /// A directory without sub-directories, deleted as one unit.
    LeafDirectory,
}

/// Something eviction may delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovableCandidate {
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Newest modification time of the entry (and, for a leaf directory,
    /// of its immediate files).
    pub modified: SystemTime,
    pub kind: CandidateKind,
    pub owner_uid: u32,
}

/// Total and available bytes of a filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DiskStats {
    pub total_bytes: u64,
    pub free_bytes: u64,
}

/// The candidates chosen to cover a deficit, oldest first.
#[derive(Debug, Clone, Default)]
pub struct EvictionPlan {
    pub deficit: u64,
    pub selected: Vec<RemovableCandidate>,
}

impl EvictionPlan {
    pub fn planned_bytes(&self) -> u64 {
        self.selected.iter().map(|c| c.size_bytes).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }
}

/// Outcome of an eviction pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EvictionReport {
    pub freed_bytes: u64,
    pub deleted: Vec<PathBuf>,
}
