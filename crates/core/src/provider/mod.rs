//! Per-provider settings: concurrency limits and transfer options.
//!
//! A provider is identified by the `scheme://host[:port]` of a source URI.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Provider key used for sources that are not URLs (plain paths).
pub const LOCAL_PROVIDER: &str = "file://";

/// Settings for one provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Maximum simultaneous downloads from this provider. Unset or zero
    /// disables admission control.
    #[serde(default)]
    pub max_parallel_downloads: Option<u32>,

    /// Options handed to the transfer strategy (credentials, status codes...).
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl ProviderSettings {
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.max_parallel_downloads = Some(limit);
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Failed to read provider settings {path}: {message}")]
    Load { path: String, message: String },

    #[error("Invalid provider settings: {0}")]
    Invalid(String),
}

/// Derive the provider key (`scheme://host[:port]`) of a source URI.
///
/// Bare filesystem paths and URIs without a host map to [`LOCAL_PROVIDER`].
pub fn provider_key(uri: &str) -> String {
    match Url::parse(uri) {
        Ok(url) => match url.host_str() {
            Some(host) => match url.port() {
                Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
                None => format!("{}://{}", url.scheme(), host),
            },
            None => format!("{}://", url.scheme()),
        },
        Err(_) => LOCAL_PROVIDER.to_string(),
    }
}

/// Known providers, keyed by URI prefix.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, ProviderSettings>,
}

impl ProviderRegistry {
    pub fn new(providers: BTreeMap<String, ProviderSettings>) -> Self {
        Self { providers }
    }

    /// Add or replace the settings of one provider prefix.
    pub fn with_provider(mut self, prefix: impl Into<String>, settings: ProviderSettings) -> Self {
        self.providers.insert(prefix.into(), settings);
        self
    }

    /// Merge settings read from a TOML file. Entries from the file win.
    pub fn merge_file(mut self, path: &Path) -> Result<Self, ProviderError> {
        let loaded = load_provider_settings(path)?;
        debug!(
            "Loaded settings for {} providers from {}",
            loaded.len(),
            path.display()
        );
        self.providers.extend(loaded);
        Ok(self)
    }

    /// Settings for a provider key.
    ///
    /// The first configured prefix (in key order) that is `provider_key`
    /// itself or continues it with a path matches, so a configured
    /// `https://host/some/path` applies to every source on `https://host`
    /// while `https://host.mirror.net` does not.
    pub fn settings_for(&self, provider_key: &str) -> Option<&ProviderSettings> {
        self.providers
            .iter()
            .find(|(prefix, _)| {
                prefix
                    .strip_prefix(provider_key)
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
            })
            .map(|(_, settings)| settings)
    }

    /// Concurrency limit for a provider key, if any.
    pub fn limit_for(&self, provider_key: &str) -> Option<u32> {
        self.settings_for(provider_key)
            .and_then(|s| s.max_parallel_downloads)
    }

    pub fn providers(&self) -> &BTreeMap<String, ProviderSettings> {
        &self.providers
    }
}

/// Read a TOML file of `["<prefix>"]` provider tables.
pub fn load_provider_settings(
    path: &Path,
) -> Result<BTreeMap<String, ProviderSettings>, ProviderError> {
    let content = std::fs::read_to_string(path).map_err(|e| ProviderError::Load {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    toml::from_str(&content).map_err(|e| ProviderError::Invalid(e.to_string()))
}
