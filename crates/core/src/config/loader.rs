use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::{Path, PathBuf};

use super::{types::Config, ConfigError};

/// Environment variable prefix for overrides (`SLUICE_STORAGE__ROOT=/data`).
pub const ENV_PREFIX: &str = "SLUICE_";

/// Load configuration from file with environment variable overrides.
///
/// Relative paths of side files (provider settings, catalog, SQLite store)
/// are taken relative to the directory of the config file.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let mut config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    if let Some(base) = path.parent() {
        resolve_relative_paths(&mut config, base);
    }
    Ok(config)
}

fn resolve(base: &Path, path: &mut PathBuf) {
    if path.is_relative() {
        *path = base.join(&*path);
    }
}

fn resolve_relative_paths(config: &mut Config, base: &Path) {
    if let Some(path) = config.provider_settings_path.as_mut() {
        resolve(base, path);
    }
    if let Some(catalog) = config.catalog.as_mut() {
        resolve(base, &mut catalog.path);
    }
    if let Some(path) = config.coordination.path.as_mut() {
        resolve(base, path);
    }
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}
