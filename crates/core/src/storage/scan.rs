//! Enumeration of removable candidates under a storage root.

use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tracing::{debug, warn};

use super::error::EvictionError;
use super::types::{CandidateKind, RemovableCandidate};

/// What to leave out of a scan.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub protected_markers: Vec<String>,
    pub max_depth: usize,
}

impl ScanOptions {
    pub(crate) fn is_protected(&self, path: &Path) -> bool {
        path.file_name()
            .map(|name| name.to_string_lossy())
            .map(|name| {
                self.protected_markers
                    .iter()
                    .any(|marker| !marker.is_empty() && name.contains(marker.as_str()))
            })
            .unwrap_or(false)
    }
}

/// One entry of a directory listing.
struct Entry {
    path: PathBuf,
    metadata: std::fs::Metadata,
}

/// List a directory without following symlinks. Entries that vanish while
/// listing are skipped.
async fn list_dir(dir: &Path) -> io::Result<Vec<Entry>> {
    let mut entries = Vec::new();
    let mut read_dir = fs::read_dir(dir).await?;
    while let Some(entry) = read_dir.next_entry().await? {
        let path = entry.path();
        match fs::symlink_metadata(&path).await {
            Ok(metadata) => entries.push(Entry { path, metadata }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("{} was removed while a cleanup was in progress", path.display());
            }
            Err(e) => return Err(e),
        }
    }
    Ok(entries)
}

/// Space an entry occupies on disk: its length rounded up to whole
/// filesystem blocks.
pub(crate) fn disk_usage(metadata: &std::fs::Metadata) -> u64 {
    let block = metadata.blksize().max(1);
    metadata.len().div_ceil(block).saturating_mul(block)
}

fn modified(metadata: &std::fs::Metadata) -> SystemTime {
    metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH)
}

/// Walk `root` and return every removable candidate.
///
/// Regular files are candidates. A directory without sub-directories is a
/// single [`CandidateKind::LeafDirectory`] candidate; other directories are
/// descended into. The root itself, symlinks and protected entries are
/// never candidates.
pub async fn scan_candidates(
    root: &Path,
    options: &ScanOptions,
) -> Result<Vec<RemovableCandidate>, EvictionError> {
    let mut candidates = Vec::new();
    let mut pending = vec![(root.to_path_buf(), 0usize)];

    while let Some((dir, depth)) = pending.pop() {
        let entries = match list_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if dir == root => {
                return Err(EvictionError::Scan {
                    path: dir,
                    source: e,
                })
            }
            Err(e) => {
                warn!("Skipping {} during cleanup scan: {}", dir.display(), e);
                continue;
            }
        };

        for entry in entries {
            let file_type = entry.metadata.file_type();
            if file_type.is_symlink() || options.is_protected(&entry.path) {
                debug!("Not a cleanup candidate: {}", entry.path.display());
                continue;
            }

            if file_type.is_file() {
                candidates.push(RemovableCandidate {
                    size_bytes: disk_usage(&entry.metadata),
                    modified: modified(&entry.metadata),
                    kind: CandidateKind::File,
                    owner_uid: entry.metadata.uid(),
                    path: entry.path,
                });
            } else if file_type.is_dir() {
                if depth + 1 > options.max_depth {
                    warn!(
                        "Not scanning {}: deeper than {} levels",
                        entry.path.display(),
                        options.max_depth
                    );
                    continue;
                }
                match leaf_candidate(&entry, options).await {
                    Ok(Some(candidate)) => candidates.push(candidate),
                    Ok(None) => pending.push((entry.path, depth + 1)),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {
                        warn!(
                            "{} was removed while a cleanup was in progress",
                            entry.path.display()
                        );
                    }
                    Err(e) => warn!("Skipping {} during cleanup scan: {}", entry.path.display(), e),
                }
            }
        }
    }

    debug!("Found {} cleanup candidates in {}", candidates.len(), root.display());
    Ok(candidates)
}

/// Classify a directory. Returns `Ok(None)` when it has sub-directories
/// (or protected content) and must be descended into instead.
async fn leaf_candidate(
    dir: &Entry,
    options: &ScanOptions,
) -> io::Result<Option<RemovableCandidate>> {
    let children = list_dir(&dir.path).await?;

    let mut size_bytes = disk_usage(&dir.metadata);
    let mut newest = modified(&dir.metadata);
    for child in &children {
        let file_type = child.metadata.file_type();
        if file_type.is_dir() || options.is_protected(&child.path) {
            return Ok(None);
        }
        if file_type.is_file() {
            size_bytes = size_bytes.saturating_add(disk_usage(&child.metadata));
            newest = newest.max(modified(&child.metadata));
        }
    }

    Ok(Some(RemovableCandidate {
        path: dir.path.clone(),
        size_bytes,
        modified: newest,
        kind: CandidateKind::LeafDirectory,
        owner_uid: dir.metadata.uid(),
    }))
}
