//! Shared application state and startup wiring.

use std::sync::Arc;
use std::time::Instant;

use warmcache_core::{SharedClock, StorageError, SystemClock};
use warmcache_refresh::{RefreshCoordinator, RefreshRegistry, ResourceDescriptor};
use warmcache_storage::{FileCacheStore, LmdbCacheStore, SharedCacheStore};

use crate::catalog::Catalog;
use crate::config::{ServerConfig, StoreBackend};
use crate::error::ApiResult;

/// State handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<RefreshCoordinator>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(coordinator: Arc<RefreshCoordinator>) -> Self {
        Self {
            coordinator,
            start_time: Instant::now(),
        }
    }

    /// Wire a coordinator over an explicit store, clock and catalog.
    pub fn from_parts(
        store: SharedCacheStore,
        clock: SharedClock,
        descriptors: Vec<ResourceDescriptor>,
    ) -> ApiResult<Self> {
        let coordinator = RefreshCoordinator::new(store, RefreshRegistry::shared(), clock, descriptors)?;
        Ok(Self::new(Arc::new(coordinator)))
    }

    /// Open the configured store, load the catalog and wire the coordinator.
    pub fn bootstrap(config: &ServerConfig) -> ApiResult<Self> {
        let store = open_store(config)?;
        let descriptors = Catalog::load(&config.catalog_path)?.into_descriptors()?;

        tracing::info!(
            backend = store.backend_name(),
            cache_dir = %config.cache_dir.display(),
            catalog = %config.catalog_path.display(),
            resources = descriptors.len(),
            "Cache store and catalog loaded"
        );

        Self::from_parts(store, SystemClock::shared(), descriptors)
    }
}

/// Open the backend selected by `config.backend` under `config.cache_dir`.
pub fn open_store(config: &ServerConfig) -> ApiResult<SharedCacheStore> {
    let store: SharedCacheStore = match config.backend {
        StoreBackend::File => Arc::new(FileCacheStore::open(&config.cache_dir)?),
        StoreBackend::Lmdb => {
            let store = LmdbCacheStore::open(&config.cache_dir, config.lmdb_max_size_mb)
                .map_err(StorageError::from)?;
            Arc::new(store)
        }
    };
    Ok(store)
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("coordinator", &self.coordinator)
            .field("uptime_secs", &self.start_time.elapsed().as_secs())
            .finish()
    }
}
