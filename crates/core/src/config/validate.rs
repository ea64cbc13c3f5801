use super::{types::Config, ConfigError};
use crate::coordination::StoreBackend;

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Lock TTL is not 0
/// - Storage root is set
/// - The sqlite backend has a path
/// - Provider limits are not 0 (leave them unset to disable admission)
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.locking.ttl_secs == 0 {
        return Err(ConfigError::ValidationError(
            "locking.ttl_secs cannot be 0".to_string(),
        ));
    }

    if config.storage.root.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "storage.root cannot be empty".to_string(),
        ));
    }

    if config.coordination.backend == StoreBackend::Sqlite && config.coordination.path.is_none() {
        return Err(ConfigError::ValidationError(
            "coordination.path is required when coordination.backend = \"sqlite\"".to_string(),
        ));
    }

    if let Some((prefix, _)) = config
        .providers
        .iter()
        .find(|(_, settings)| settings.max_parallel_downloads == Some(0))
    {
        return Err(ConfigError::ValidationError(format!(
            "providers.\"{}\".max_parallel_downloads cannot be 0",
            prefix
        )));
    }

    Ok(())
}
