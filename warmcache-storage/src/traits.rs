//! Cache store trait and statistics.
//!
//! The coordinator only ever talks to persistence through [`CacheStore`], so
//! the backing store (flat files, LMDB, memory) can be swapped without
//! touching staleness or refresh logic.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use warmcache_core::{CacheEntry, EntryMetadata, Payload, ResourceId, StorageError, Timestamp};

/// Durable key → entry persistence with atomic replace.
///
/// # Contract
///
/// - `get` never fails: a missing entry and an unreadable or corrupt one are
///   both reported as `None`.
/// - `put` is atomic: a concurrent `get` sees either the previous complete
///   entry or the new complete entry, never a mixture. A failed `put` leaves
///   the previous entry in place.
/// - `metadata` is read-only introspection and agrees with `get` about
///   whether an entry exists.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Load the current entry for a resource.
    async fn get(&self, resource_id: &ResourceId) -> Option<CacheEntry>;

    /// Replace the entry for a resource, stamping it with `acquired_at`.
    ///
    /// Returns the entry as stored.
    async fn put(
        &self,
        resource_id: &ResourceId,
        payload: Payload,
        acquired_at: Timestamp,
    ) -> Result<CacheEntry, StorageError>;

    /// Existence, acquisition time and persisted size of an entry.
    async fn metadata(&self, resource_id: &ResourceId) -> EntryMetadata;

    /// Usage counters since the store was opened.
    async fn stats(&self) -> CacheStats;

    /// Short backend name for health output.
    fn backend_name(&self) -> &'static str;
}

/// Shared store handle.
pub type SharedCacheStore = Arc<dyn CacheStore>;

/// Statistics about cache usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    /// Reads that found a readable entry.
    pub hits: u64,
    /// Reads that found nothing.
    pub misses: u64,
    /// Reads that found an entry but could not decode it.
    pub corrupt_reads: u64,
    /// Successful writes.
    pub writes: u64,
    /// Failed writes.
    pub write_failures: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0). Corrupt reads count as misses.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses + self.corrupt_reads;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Lock-free counters shared by the backends.
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    corrupt_reads: AtomicU64,
    writes: AtomicU64,
    write_failures: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn corrupt(&self) {
        self.corrupt_reads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn write(&self, ok: bool) {
        if ok {
            self.writes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.write_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            corrupt_reads: self.corrupt_reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
        }
    }
}
