use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use super::types::{CatalogError, ResourceEntry, ResourceId};
use super::Catalog;

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    resources: Vec<ResourceEntry>,
}

/// Catalog backed by a fixed set of entries, usually loaded from TOML:
///
/// ```toml
/// [[resources]]
/// id = "42"
/// prefix = "sst_2020"
///
/// [[resources.sources]]
/// uri = "https://data.example.org/sst_2020.nc"
/// service = "http"
/// ```
#[derive(Debug, Default, Clone)]
pub struct StaticCatalog {
    entries: HashMap<ResourceId, ResourceEntry>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, replacing any entry with the same id.
    pub fn with_resource(mut self, entry: ResourceEntry) -> Self {
        self.entries.insert(entry.id.clone(), entry);
        self
    }

    /// Parse a catalog from a TOML string.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile =
            toml::from_str(toml_str).map_err(|e| CatalogError::Invalid(e.to_string()))?;
        let mut catalog = Self::new();
        for entry in file.resources {
            if catalog.entries.contains_key(&entry.id) {
                return Err(CatalogError::Invalid(format!(
                    "duplicate resource id {}",
                    entry.id
                )));
            }
            catalog = catalog.with_resource(entry);
        }
        Ok(catalog)
    }

    /// Load a catalog from a TOML file.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path).map_err(|e| CatalogError::Load {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let catalog = Self::from_toml_str(&content)?;
        info!(
            "Loaded {} catalog entries from {}",
            catalog.len(),
            path.display()
        );
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl Catalog for StaticCatalog {
    async fn resource(&self, id: &ResourceId) -> Result<ResourceEntry, CatalogError> {
        self.entries
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(id.clone()))
    }
}
