//! Mock transfer strategy for testing.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::transfer::{TransferError, TransferOptions, TransferSession, TransferStrategy};

/// Failures a [`MockTransfer`] can be told to raise on connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Connection,
    Timeout,
    Obsolete,
    MissingSettings,
}

impl MockFailure {
    fn to_error(self, uri: &str) -> TransferError {
        let uri = uri.to_string();
        match self {
            MockFailure::Connection => TransferError::Connection {
                uri,
                message: "connection refused".to_string(),
            },
            MockFailure::Timeout => TransferError::Timeout { uri },
            MockFailure::Obsolete => TransferError::Obsolete {
                uri,
                reason: "404 Not Found".to_string(),
            },
            MockFailure::MissingSettings => TransferError::MissingSettings {
                keys: vec!["password".to_string()],
            },
        }
    }
}

/// A remote file served by [`MockTransfer`].
#[derive(Debug, Clone)]
pub struct ScriptedSession {
    uri: String,
    file_name: Option<String>,
    size: Option<u64>,
    chunks: VecDeque<Vec<u8>>,
    interrupt: bool,
    stall: bool,
    active: Option<ActiveGuard>,
}

impl ScriptedSession {
    /// A file named `file_name` with `data` as content and a known size.
    pub fn new(file_name: &str, data: Vec<u8>) -> Self {
        let size = Some(data.len() as u64);
        let chunks = if data.is_empty() {
            VecDeque::new()
        } else {
            VecDeque::from([data])
        };
        Self {
            uri: String::new(),
            file_name: Some(file_name.to_string()),
            size,
            chunks,
            interrupt: false,
            stall: false,
            active: None,
        }
    }

    /// Do not announce a size.
    pub fn without_size(mut self) -> Self {
        self.size = None;
        self
    }

    /// Do not announce a file name.
    pub fn without_file_name(mut self) -> Self {
        self.file_name = None;
        self
    }

    /// Fail with an interruption after the data has been sent.
    pub fn interrupted(mut self) -> Self {
        self.interrupt = true;
        self
    }

    /// Never deliver a chunk, like a server that stops sending mid-transfer.
    pub fn stalled(mut self) -> Self {
        self.stall = true;
        self
    }
}

#[async_trait]
impl TransferSession for ScriptedSession {
    fn file_name(&self) -> Option<String> {
        self.file_name.clone()
    }

    fn remote_size(&self) -> Option<u64> {
        self.size
    }

    async fn chunk(&mut self) -> Result<Option<Vec<u8>>, TransferError> {
        if self.stall {
            std::future::pending::<()>().await;
        }
        if let Some(chunk) = self.chunks.pop_front() {
            return Ok(Some(chunk));
        }
        if self.interrupt {
            return Err(TransferError::Interrupted {
                uri: self.uri.clone(),
                message: "connection reset".to_string(),
            });
        }
        Ok(None)
    }
}

/// Counts sessions alive at the same time.
#[derive(Debug)]
struct ActiveGuard {
    active: Arc<AtomicUsize>,
}

impl Clone for ActiveGuard {
    fn clone(&self) -> Self {
        self.active.fetch_add(1, Ordering::SeqCst);
        Self {
            active: Arc::clone(&self.active),
        }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone)]
enum Scripted {
    Session(ScriptedSession),
    Failure(MockFailure),
}

/// Mock implementation of the TransferStrategy trait.
///
/// Provides controllable behavior for testing:
/// - Serve scripted files per URI
/// - Fail connections with a chosen error
/// - Record every connect call
/// - Track the highest number of simultaneous sessions
///
/// # Example
///
/// ```rust,ignore
/// use sluice_core::testing::{MockTransfer, ScriptedSession};
///
/// let transfer = MockTransfer::new();
/// transfer
///     .add_session("https://a/x.nc", ScriptedSession::new("x.nc", b"data".to_vec()))
///     .await;
///
/// // ... run a download ...
///
/// assert_eq!(transfer.connect_count().await, 1);
/// ```
#[derive(Debug, Clone)]
pub struct MockTransfer {
    scripts: Arc<RwLock<HashMap<String, Scripted>>>,
    connects: Arc<RwLock<Vec<String>>>,
    delay: Arc<RwLock<Option<Duration>>>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl Default for MockTransfer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransfer {
    /// Create a new mock transfer with no scripted URIs.
    pub fn new() -> Self {
        Self {
            scripts: Arc::new(RwLock::new(HashMap::new())),
            connects: Arc::new(RwLock::new(Vec::new())),
            delay: Arc::new(RwLock::new(None)),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Serve `session` for `uri`. Every connect gets a fresh copy.
    pub async fn add_session(&self, uri: &str, session: ScriptedSession) {
        self.scripts
            .write()
            .await
            .insert(uri.to_string(), Scripted::Session(session));
    }

    /// Fail every connect to `uri`.
    pub async fn add_failure(&self, uri: &str, failure: MockFailure) {
        self.scripts
            .write()
            .await
            .insert(uri.to_string(), Scripted::Failure(failure));
    }

    /// Sleep this long in every connect.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = Some(delay);
    }

    /// URIs passed to connect, in call order.
    pub async fn connected_uris(&self) -> Vec<String> {
        self.connects.read().await.clone()
    }

    /// Number of connect calls.
    pub async fn connect_count(&self) -> usize {
        self.connects.read().await.len()
    }

    /// Highest number of sessions that were open at the same time.
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransferStrategy for MockTransfer {
    fn name(&self) -> &str {
        "mock"
    }

    async fn connect(
        &self,
        uri: &str,
        _options: &TransferOptions,
    ) -> Result<Box<dyn TransferSession>, TransferError> {
        self.connects.write().await.push(uri.to_string());

        let current = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(current, Ordering::SeqCst);
        let guard = ActiveGuard {
            active: Arc::clone(&self.active),
        };

        let delay = *self.delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.scripts.read().await.get(uri).cloned();
        match scripted {
            Some(Scripted::Session(mut session)) => {
                session.uri = uri.to_string();
                session.active = Some(guard);
                Ok(Box::new(session))
            }
            Some(Scripted::Failure(failure)) => Err(failure.to_error(uri)),
            None => Err(MockFailure::Obsolete.to_error(uri)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_session() {
        let transfer = MockTransfer::new();
        transfer
            .add_session("https://a/x.nc", ScriptedSession::new("x.nc", b"abc".to_vec()))
            .await;

        let mut session = transfer
            .connect("https://a/x.nc", &TransferOptions::new())
            .await
            .unwrap();
        assert_eq!(session.file_name().as_deref(), Some("x.nc"));
        assert_eq!(session.remote_size(), Some(3));
        assert_eq!(session.chunk().await.unwrap(), Some(b"abc".to_vec()));
        assert_eq!(session.chunk().await.unwrap(), None);
        assert_eq!(transfer.max_concurrent(), 1);
    }

    #[tokio::test]
    async fn test_failures_and_unknown_uris() {
        let transfer = MockTransfer::new();
        transfer
            .add_failure("https://a/x.nc", MockFailure::Timeout)
            .await;

        let err = transfer
            .connect("https://a/x.nc", &TransferOptions::new())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, TransferError::Timeout { .. }));

        let err = transfer
            .connect("https://a/unknown.nc", &TransferOptions::new())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, TransferError::Obsolete { .. }));
        assert_eq!(transfer.connect_count().await, 2);
    }
}
