//! Mock catalog for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::catalog::{Catalog, CatalogError, ResourceEntry, ResourceId};

/// Mock implementation of the Catalog trait.
///
/// Serves the entries it was given and records every lookup.
#[derive(Debug, Clone, Default)]
pub struct MockCatalog {
    entries: Arc<RwLock<HashMap<ResourceId, ResourceEntry>>>,
    lookups: Arc<RwLock<Vec<ResourceId>>>,
}

impl MockCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_resource(&self, entry: ResourceEntry) {
        self.entries.write().await.insert(entry.id.clone(), entry);
    }

    pub async fn remove_resource(&self, id: &ResourceId) {
        self.entries.write().await.remove(id);
    }

    /// Resource ids looked up so far.
    pub async fn lookups(&self) -> Vec<ResourceId> {
        self.lookups.read().await.clone()
    }
}

#[async_trait]
impl Catalog for MockCatalog {
    async fn resource(&self, id: &ResourceId) -> Result<ResourceEntry, CatalogError> {
        self.lookups.write().await.push(id.clone());
        self.entries
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(id.clone()))
    }
}
