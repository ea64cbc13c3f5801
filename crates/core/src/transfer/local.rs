//! Copies of files reachable on a local or mounted filesystem.

use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use url::Url;

use super::error::TransferError;
use super::traits::{TransferOptions, TransferSession, TransferStrategy};

const CHUNK_SIZE: usize = 1024 * 1024;

/// Reads `file://` URIs and bare paths.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalTransfer;

impl LocalTransfer {
    pub fn new() -> Self {
        Self
    }
}

fn source_path(uri: &str) -> Result<PathBuf, TransferError> {
    if uri.starts_with("file:") {
        let url = Url::parse(uri).map_err(|e| TransferError::Obsolete {
            uri: uri.to_string(),
            reason: e.to_string(),
        })?;
        url.to_file_path().map_err(|_| TransferError::Obsolete {
            uri: uri.to_string(),
            reason: "not a local path".to_string(),
        })
    } else {
        Ok(PathBuf::from(uri))
    }
}

#[async_trait]
impl TransferStrategy for LocalTransfer {
    fn name(&self) -> &str {
        "local"
    }

    async fn connect(
        &self,
        uri: &str,
        _options: &TransferOptions,
    ) -> Result<Box<dyn TransferSession>, TransferError> {
        let path = source_path(uri)?;
        let file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(TransferError::Obsolete {
                    uri: uri.to_string(),
                    reason: "no such file".to_string(),
                })
            }
            Err(source) => {
                return Err(TransferError::Source {
                    uri: uri.to_string(),
                    source,
                })
            }
        };
        let metadata = file.metadata().await.map_err(|source| TransferError::Source {
            uri: uri.to_string(),
            source,
        })?;
        if !metadata.is_file() {
            return Err(TransferError::Obsolete {
                uri: uri.to_string(),
                reason: "not a regular file".to_string(),
            });
        }

        Ok(Box::new(LocalSession {
            uri: uri.to_string(),
            file_name: path.file_name().map(|n| n.to_string_lossy().into_owned()),
            size: metadata.len(),
            file,
            buffer: vec![0u8; CHUNK_SIZE],
        }))
    }
}

struct LocalSession {
    uri: String,
    file_name: Option<String>,
    size: u64,
    file: File,
    buffer: Vec<u8>,
}

#[async_trait]
impl TransferSession for LocalSession {
    fn file_name(&self) -> Option<String> {
        self.file_name.clone()
    }

    fn remote_size(&self) -> Option<u64> {
        Some(self.size)
    }

    async fn chunk(&mut self) -> Result<Option<Vec<u8>>, TransferError> {
        let read = self
            .file
            .read(&mut self.buffer)
            .await
            .map_err(|e| TransferError::Interrupted {
                uri: self.uri.clone(),
                message: e.to_string(),
            })?;
        if read == 0 {
            Ok(None)
        } else {
            Ok(Some(self.buffer[..read].to_vec()))
        }
    }
}
