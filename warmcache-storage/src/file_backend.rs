//! Flat-file cache store: one JSON document per resource.
//!
//! # Layout
//!
//! ```text
//! <dir>/<resource_id>.json   {"resource_id": ..., "acquired_at": ..., "payload": ...}
//! ```
//!
//! # Atomicity
//!
//! Writes go to a uniquely named temporary file in the same directory, are
//! fsynced, then renamed over the target. Rename within one filesystem is
//! atomic, so readers see the old document or the new one and a crash
//! mid-write leaves the old document intact. Orphaned temporaries from a
//! crash are swept when the store is opened.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};
use warmcache_core::{CacheEntry, EntryMetadata, Payload, ResourceId, StorageError, Timestamp};

use crate::traits::{CacheStats, CacheStore, StatsCounters};

const TEMP_PREFIX: &str = ".warmcache-";
const TEMP_SUFFIX: &str = ".tmp";

/// File-backed cache store.
#[derive(Debug)]
pub struct FileCacheStore {
    dir: PathBuf,
    stats: StatsCounters,
}

/// What a read of the backing file turned up.
enum Loaded {
    Missing,
    Corrupt(String),
    Entry { entry: CacheEntry, size_bytes: u64 },
}

impl FileCacheStore {
    /// Open (and create if needed) a store rooted at `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| StorageError::TransactionFailed {
            reason: format!("cannot create cache directory {}: {}", dir.display(), e),
        })?;

        let store = Self {
            dir,
            stats: StatsCounters::default(),
        };
        store.sweep_temporaries();
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, resource_id: &ResourceId) -> PathBuf {
        self.dir.join(format!("{}.json", resource_id))
    }

    /// Remove temporaries left behind by a process that died mid-write.
    fn sweep_temporaries(&self) {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return;
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(TEMP_PREFIX) && name.ends_with(TEMP_SUFFIX) {
                match std::fs::remove_file(entry.path()) {
                    Ok(()) => debug!(file = %name, "Removed orphaned cache temporary"),
                    Err(e) => warn!(file = %name, error = %e, "Failed to remove orphaned cache temporary"),
                }
            }
        }
    }

    async fn load(&self, resource_id: &ResourceId) -> Loaded {
        let path = self.path_for(resource_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Loaded::Missing,
            Err(e) => return Loaded::Corrupt(format!("read failed: {}", e)),
        };

        match serde_json::from_slice::<CacheEntry>(&bytes) {
            Ok(entry) if entry.resource_id == *resource_id => Loaded::Entry {
                entry,
                size_bytes: bytes.len() as u64,
            },
            Ok(entry) => Loaded::Corrupt(format!(
                "document belongs to resource {}",
                entry.resource_id
            )),
            Err(e) => Loaded::Corrupt(e.to_string()),
        }
    }
}

#[async_trait]
impl CacheStore for FileCacheStore {
    async fn get(&self, resource_id: &ResourceId) -> Option<CacheEntry> {
        match self.load(resource_id).await {
            Loaded::Entry { entry, .. } => {
                self.stats.hit();
                Some(entry)
            }
            Loaded::Missing => {
                self.stats.miss();
                None
            }
            Loaded::Corrupt(reason) => {
                self.stats.corrupt();
                warn!(resource = %resource_id, reason = %reason, "Cached entry unreadable, treating as absent");
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
        let bytes = serde_json::to_vec_pretty(&entry).map_err(|e| StorageError::Serialization {
            resource_id: resource_id.clone(),
            reason: e.to_string(),
        })?;

        let dir = self.dir.clone();
        let target = self.path_for(resource_id);
        let id = resource_id.clone();

        let result = tokio::task::spawn_blocking(move || write_atomically(&dir, &target, &bytes))
            .await
            .map_err(|e| StorageError::Io {
                resource_id: id.clone(),
                reason: format!("writer task failed: {}", e),
            })
            .and_then(|inner| {
                inner.map_err(|reason| StorageError::Io {
                    resource_id: id.clone(),
                    reason,
                })
            });

        self.stats.write(result.is_ok());
        result.map(|()| entry)
    }

    async fn metadata(&self, resource_id: &ResourceId) -> EntryMetadata {
        match self.load(resource_id).await {
            Loaded::Entry { entry, size_bytes } => {
                EntryMetadata::present(entry.acquired_at, size_bytes)
            }
            Loaded::Missing | Loaded::Corrupt(_) => EntryMetadata::absent(),
        }
    }

    async fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}

/// Write-complete-then-publish.
fn write_atomically(dir: &Path, target: &Path, bytes: &[u8]) -> Result<(), String> {
    let mut tmp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(TEMP_SUFFIX)
        .tempfile_in(dir)
        .map_err(|e| format!("cannot create temporary file: {}", e))?;

    tmp.write_all(bytes)
        .map_err(|e| format!("cannot write temporary file: {}", e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| format!("cannot sync temporary file: {}", e))?;
    tmp.persist(target)
        .map_err(|e| format!("cannot publish {}: {}", target.display(), e.error))?;
    Ok(())
}
