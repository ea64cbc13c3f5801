//! Resource catalog - read-only lookup of where a resource can be fetched.
//!
//! The catalog is owned by another system; this crate only queries it.

mod static_catalog;
mod types;

pub use static_catalog::StaticCatalog;
pub use types::*;

use async_trait::async_trait;

/// Read-only source of resource metadata.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Returns the entry for a resource, with its sources in preference order.
    async fn resource(&self, id: &ResourceId) -> Result<ResourceEntry, CatalogError>;
}
