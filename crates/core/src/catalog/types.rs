//! Types for the resource catalog.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Stable identifier of one logical resource (a dataset).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ResourceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for ResourceId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// Well-known service tags.
pub mod services {
    /// Plain HTTP(S) download.
    pub const HTTP: &str = "http";
    /// OPeNDAP endpoint, fetched over HTTP.
    pub const OPENDAP: &str = "opendap";
    /// File already reachable on a local or mounted filesystem.
    pub const LOCAL: &str = "local";
}

/// One place a resource can be fetched from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCandidate {
    /// Location of the data.
    pub uri: String,
    /// Service tag selecting the transfer strategy (e.g. "http").
    pub service: String,
}

impl SourceCandidate {
    pub fn new(uri: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            service: service.into(),
        }
    }
}

/// A catalog entry: the stored-file prefix and the ordered sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceEntry {
    pub id: ResourceId,
    /// File name prefix under the storage root.
    pub prefix: String,
    /// Candidate sources, in preference order.
    #[serde(default)]
    pub sources: Vec<SourceCandidate>,
}

/// Errors that can occur when querying the catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Resource not found: {0}")]
    NotFound(ResourceId),

    #[error("Failed to read catalog {path}: {message}")]
    Load { path: String, message: String },

    #[error("Invalid catalog: {0}")]
    Invalid(String),
}
