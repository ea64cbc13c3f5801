//! Transfer strategies and the download-to-storage write path.

mod error;
mod http;
mod local;
mod traits;

pub use error::TransferError;
pub use http::HttpTransfer;
pub use local::LocalTransfer;
pub use traits::{TransferOptions, TransferSession, TransferStrategy};

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::storage::StorageEvictionEngine;

/// Check that every key in `keys` has a non-empty value in `options`.
pub fn validate_settings(options: &TransferOptions, keys: &[&str]) -> Result<(), TransferError> {
    let missing: Vec<String> = keys
        .iter()
        .filter(|key| options.get(**key).map(|v| v.is_empty()).unwrap_or(true))
        .map(|key| key.to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(TransferError::MissingSettings { keys: missing })
    }
}

/// Name under which a downloaded file is stored: `<prefix>_<name>`.
pub fn stored_name(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}_{}", prefix, name)
    }
}

/// Download `uri` into `dir` and return the stored file name.
///
/// When the remote size is known, that much space is reserved through the
/// eviction engine before anything is written. On any failure, or when the
/// returned future is dropped mid-transfer, the partial file is removed.
pub async fn download_url(
    strategy: &dyn TransferStrategy,
    uri: &str,
    dir: &Path,
    prefix: &str,
    options: &TransferOptions,
    space: &StorageEvictionEngine,
) -> Result<String, TransferError> {
    let mut session = strategy.connect(uri, options).await?;
    let name = session
        .file_name()
        .ok_or_else(|| TransferError::MissingFileName {
            uri: uri.to_string(),
        })?;
    let file_name = stored_name(prefix, &name);
    let path = dir.join(&file_name);

    if let Some(size) = session.remote_size() {
        debug!("Checking there is enough free space to download {} bytes", size);
        space.free_space(dir, size).await?;
    }

    let mut partial = PartialFile {
        path: path.clone(),
        complete: false,
    };
    let written = write_session(session.as_mut(), uri, &path).await?;
    partial.complete = true;
    debug!("Wrote {} bytes to {}", written, path.display());
    Ok(file_name)
}

/// A file being written, removed on drop unless it was completed.
struct PartialFile {
    path: PathBuf,
    complete: bool,
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.complete {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed partial file {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove partial file {}: {}", self.path.display(), e),
        }
    }
}

async fn write_session(
    session: &mut dyn TransferSession,
    uri: &str,
    path: &Path,
) -> Result<u64, TransferError> {
    let mut file = fs::File::create(path)
        .await
        .map_err(|e| TransferError::from_write(path.to_path_buf(), e))?;

    let mut written = 0u64;
    while let Some(chunk) = session.chunk().await? {
        file.write_all(&chunk)
            .await
            .map_err(|e| TransferError::from_write(path.to_path_buf(), e))?;
        written += chunk.len() as u64;
    }
    file.flush()
        .await
        .map_err(|e| TransferError::from_write(path.to_path_buf(), e))?;

    if written == 0 {
        return Err(TransferError::EmptyPayload {
            uri: uri.to_string(),
        });
    }
    Ok(written)
}
