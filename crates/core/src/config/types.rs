use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::coordination::{CoordinationConfig, StoreBackend};
use crate::lock::LockConfig;
use crate::provider::ProviderSettings;
use crate::retry::RetryConfig;
use crate::storage::StorageConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub coordination: CoordinationConfig,
    #[serde(default)]
    pub locking: LockConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    /// Provider settings keyed by URI prefix (`scheme://host[/path]`).
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderSettings>,
    /// Separate TOML file with more provider tables. Its entries win.
    #[serde(default)]
    pub provider_settings_path: Option<PathBuf>,
    #[serde(default)]
    pub catalog: Option<CatalogConfig>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Logging configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human readable text.
    #[serde(default)]
    pub json: bool,
}

/// Transfer configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransferConfig {
    /// Timeout of a whole HTTP transfer.
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            http_timeout_secs: default_http_timeout(),
        }
    }
}

fn default_http_timeout() -> u64 {
    3600
}

impl TransferConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

/// Static catalog configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogConfig {
    /// TOML file listing the resources and their sources.
    pub path: PathBuf,
}

/// Sanitized config for API responses (provider options redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub coordination: SanitizedCoordinationConfig,
    pub locking: LockConfig,
    pub storage: StorageConfig,
    pub retry: RetryConfig,
    pub transfer: TransferConfig,
    pub providers: BTreeMap<String, SanitizedProviderSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog: Option<CatalogConfig>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedCoordinationConfig {
    pub backend: StoreBackend,
    pub path_configured: bool,
}

/// Sanitized provider settings (option values hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedProviderSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_parallel_downloads: Option<u32>,
    /// Names of the configured options.
    pub options_configured: Vec<String>,
}

impl From<&ProviderSettings> for SanitizedProviderSettings {
    fn from(settings: &ProviderSettings) -> Self {
        Self {
            max_parallel_downloads: settings.max_parallel_downloads,
            options_configured: settings.options.keys().cloned().collect(),
        }
    }
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            logging: config.logging.clone(),
            coordination: SanitizedCoordinationConfig {
                backend: config.coordination.backend,
                path_configured: config.coordination.path.is_some(),
            },
            locking: config.locking.clone(),
            storage: config.storage.clone(),
            retry: config.retry.clone(),
            transfer: config.transfer.clone(),
            providers: config
                .providers
                .iter()
                .map(|(prefix, settings)| (prefix.clone(), settings.into()))
                .collect(),
            catalog: config.catalog.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_minimal_config() {
        let toml = r#"
[storage]
root = "/data/working"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.storage.root.to_str().unwrap(), "/data/working");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert_eq!(config.coordination.backend, StoreBackend::Disabled);
        assert_eq!(config.locking.ttl_secs, 3600);
        assert_eq!(config.storage.cleanup_max_retries, 30);
        assert_eq!(config.retry.admission_max_retries, 960);
        assert_eq!(config.transfer.http_timeout(), Duration::from_secs(3600));
        assert!(!config.logging.json);
        assert!(config.providers.is_empty());
        assert!(config.catalog.is_none());
    }

    #[test]
    fn test_storage_is_required() {
        let toml = r#"
[server]
port = 9000
"#;
        assert!(toml::from_str::<Config>(toml).is_err());
    }

    #[test]
    fn test_deserialize_providers() {
        let toml = r#"
[storage]
root = "/data"

[providers."https://my.cmems-du.eu"]
max_parallel_downloads = 2

[providers."https://my.cmems-du.eu".options]
username = "user"
password = "secret"

[providers."ftp://ftp.remss.com"]
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let cmems = &config.providers["https://my.cmems-du.eu"];
        assert_eq!(cmems.max_parallel_downloads, Some(2));
        assert_eq!(cmems.options["password"], "secret");
        assert_eq!(config.providers["ftp://ftp.remss.com"].max_parallel_downloads, None);
    }

    #[test]
    fn test_sanitized_config_hides_provider_options() {
        let toml = r#"
[storage]
root = "/data"

[coordination]
backend = "sqlite"
path = "/shared/coordination.db"

[providers."https://a".options]
username = "user"
password = "secret"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let sanitized = SanitizedConfig::from(&config);
        assert!(sanitized.coordination.path_configured);
        assert_eq!(
            sanitized.providers["https://a"].options_configured,
            vec!["password".to_string(), "username".to_string()]
        );

        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("secret"));
        assert!(!json.contains("/shared/coordination.db"));
    }
}
