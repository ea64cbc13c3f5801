use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use sluice_core::{
    create_store, Catalog, Config, DownloadOrchestrator, ProviderAdmissionGate, ProviderRegistry,
    ResourceLock, SanitizedConfig, StaticCatalog, StatvfsUsage, StorageEvictionEngine, TaskRunner,
};

/// Shared application state
pub struct AppState {
    config: Config,
    runner: TaskRunner,
}

impl AppState {
    pub fn new(config: Config, runner: TaskRunner) -> Self {
        Self { config, runner }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn runner(&self) -> &TaskRunner {
        &self.runner
    }

    pub fn gate(&self) -> &ProviderAdmissionGate {
        self.runner.orchestrator().gate()
    }

    pub fn providers(&self) -> &ProviderRegistry {
        self.runner.orchestrator().providers()
    }
}

/// Wire the coordination store, lock, gate, eviction engine, orchestrator
/// and catalog described by `config` into a [`TaskRunner`].
pub fn build_runner(config: &Config) -> Result<TaskRunner> {
    let store = create_store(&config.coordination).context("Failed to open coordination store")?;
    info!("Coordination store: {}", store.name());

    let lock = ResourceLock::from_config(Arc::clone(&store), &config.locking);
    let gate = ProviderAdmissionGate::new(Arc::clone(&store));

    let eviction = Arc::new(StorageEvictionEngine::new(
        lock.clone(),
        Arc::new(StatvfsUsage::new()),
        config.storage.clone(),
    ));
    info!("Storage root: {:?}", eviction.root());

    let mut providers = ProviderRegistry::new(config.providers.clone());
    if let Some(path) = &config.provider_settings_path {
        providers = providers
            .merge_file(path)
            .with_context(|| format!("Failed to load provider settings from {:?}", path))?;
    }
    info!("Configured providers: {}", providers.providers().len());

    let orchestrator = DownloadOrchestrator::new(gate, Arc::clone(&eviction), providers)
        .with_default_strategies(config.transfer.http_timeout())
        .context("Failed to create transfer strategies")?;
    info!("Transfer services: {:?}", orchestrator.services());

    let catalog: Arc<dyn Catalog> = match &config.catalog {
        Some(catalog) => {
            let loaded = StaticCatalog::load(&catalog.path)
                .with_context(|| format!("Failed to load catalog from {:?}", catalog.path))?;
            info!("Loaded {} resources from {:?}", loaded.len(), catalog.path);
            Arc::new(loaded)
        }
        None => {
            info!("No catalog configured, every resource lookup will fail");
            Arc::new(StaticCatalog::new())
        }
    };

    Ok(TaskRunner::new(
        lock,
        Arc::new(orchestrator),
        eviction,
        catalog,
        config.retry.clone(),
    ))
}
