use async_trait::async_trait;
use std::collections::BTreeMap;

use super::error::TransferError;

/// Options handed to a strategy, taken from the provider settings.
pub type TransferOptions = BTreeMap<String, String>;

/// A way of fetching data for one service tag.
#[async_trait]
pub trait TransferStrategy: Send + Sync {
    /// Strategy name for logging.
    fn name(&self) -> &str;

    /// Open the remote data. Nothing is written to disk yet.
    async fn connect(
        &self,
        uri: &str,
        options: &TransferOptions,
    ) -> Result<Box<dyn TransferSession>, TransferError>;
}

/// An opened remote file.
#[async_trait]
pub trait TransferSession: Send {
    /// Name of the remote file, when it can be determined.
    fn file_name(&self) -> Option<String>;

    /// Size of the remote file in bytes, when known up front.
    fn remote_size(&self) -> Option<u64>;

    /// Next chunk of data, `None` at the end.
    async fn chunk(&mut self) -> Result<Option<Vec<u8>>, TransferError>;
}
