//! In-process cache store.
//!
//! Nothing survives a restart. Used by tests and by deployments that only
//! want request coalescing without persistence.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use warmcache_core::{CacheEntry, EntryMetadata, Payload, ResourceId, StorageError, Timestamp};

use crate::traits::{CacheStats, CacheStore, StatsCounters};

#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    entries: RwLock<HashMap<ResourceId, CacheEntry>>,
    stats: StatsCounters,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an entry without touching the counters.
    pub fn insert(&self, entry: CacheEntry) -> Result<(), StorageError> {
        let mut entries = self.entries.write().map_err(|_| StorageError::LockPoisoned)?;
        entries.insert(entry.resource_id.clone(), entry);
        Ok(())
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, resource_id: &ResourceId) -> Option<CacheEntry> {
        let found = match self.entries.read() {
            Ok(entries) => entries.get(resource_id).cloned(),
            Err(_) => {
                self.stats.corrupt();
                return None;
            }
        };
        match found {
            Some(entry) => {
                self.stats.hit();
                Some(entry)
            }
            None => {
                self.stats.miss();
                None
            }
        }
    }

    async fn put(
        &self,
        resource_id: &ResourceId,
        payload: Payload,
        acquired_at: Timestamp,
    ) -> Result<CacheEntry, StorageError> {
        let entry = CacheEntry::new(resource_id.clone(), payload, acquired_at);
        let result = self.insert(entry.clone());
        self.stats.write(result.is_ok());
        result.map(|()| entry)
    }

    async fn metadata(&self, resource_id: &ResourceId) -> EntryMetadata {
        let Ok(entries) = self.entries.read() else {
            return EntryMetadata::absent();
        };
        match entries.get(resource_id) {
            Some(entry) => {
                let size = serde_json::to_vec(&entry.payload)
                    .map(|b| b.len() as u64)
                    .unwrap_or(0);
                EntryMetadata::present(entry.acquired_at, size)
            }
            None => EntryMetadata::absent(),
        }
    }

    async fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
