//! LMDB-backed cache store.
//!
//! Uses the heed crate (Rust bindings for LMDB) for a memory-mapped store
//! with ACID transactions. A committed write transaction replaces the whole
//! value, which gives the atomic-replace guarantee [`CacheStore`] requires.
//!
//! # Value layout
//!
//! ```text
//! [acquired_at: 8 bytes, i64 LE nanoseconds since epoch][payload JSON]
//! ```
//!
//! Keys are the resource id bytes.

use std::path::Path;

use async_trait::async_trait;
use chrono::DateTime;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use tracing::warn;
use warmcache_core::{CacheEntry, EntryMetadata, Payload, ResourceId, StorageError, Timestamp};

use crate::traits::{CacheStats, CacheStore, StatsCounters};

const HEADER_LEN: usize = 8;

/// Error type for LMDB cache operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStoreError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbStoreError> for StorageError {
    fn from(e: LmdbStoreError) -> Self {
        StorageError::TransactionFailed {
            reason: e.to_string(),
        }
    }
}

/// LMDB-backed cache store.
pub struct LmdbCacheStore {
    env: Env,
    db: Database<Bytes, Bytes>,
    stats: StatsCounters,
}

impl std::fmt::Debug for LmdbCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbCacheStore")
            .field("path", &self.env.path())
            .finish_non_exhaustive()
    }
}

impl LmdbCacheStore {
    /// Open (and create if needed) an LMDB store.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbStoreError> {
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment is opened once per path by this process.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbStoreError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbStoreError::DbOpen(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        Ok(Self {
            env,
            db,
            stats: StatsCounters::default(),
        })
    }

    /// Number of stored entries.
    pub fn len(&self) -> Result<u64, LmdbStoreError> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
        self.db
            .len(&rtxn)
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))
    }

    pub fn is_empty(&self) -> Result<bool, LmdbStoreError> {
        Ok(self.len()? == 0)
    }

    /// Raw stored bytes for a key, copied out of the read transaction.
    fn raw(&self, resource_id: &ResourceId) -> Result<Option<Vec<u8>>, LmdbStoreError> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
        let value = self
            .db
            .get(&rtxn, resource_id.as_str().as_bytes())
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
        Ok(value.map(<[u8]>::to_vec))
    }
}

fn decode_acquired_at(bytes: &[u8]) -> Option<Timestamp> {
    let header: [u8; HEADER_LEN] = bytes.get(..HEADER_LEN)?.try_into().ok()?;
    Some(DateTime::from_timestamp_nanos(i64::from_le_bytes(header)))
}

fn decode(resource_id: &ResourceId, bytes: &[u8]) -> Result<CacheEntry, String> {
    let acquired_at = decode_acquired_at(bytes).ok_or("value shorter than header")?;
    let payload: Payload =
        serde_json::from_slice(&bytes[HEADER_LEN..]).map_err(|e| e.to_string())?;
    Ok(CacheEntry::new(resource_id.clone(), payload, acquired_at))
}

fn encode(resource_id: &ResourceId, payload: &Payload, acquired_at: Timestamp) -> Result<Vec<u8>, StorageError> {
    let nanos = acquired_at
        .timestamp_nanos_opt()
        .ok_or_else(|| StorageError::Serialization {
            resource_id: resource_id.clone(),
            reason: format!("acquisition time {} out of range", acquired_at),
        })?;
    let value_bytes = serde_json::to_vec(payload).map_err(|e| StorageError::Serialization {
        resource_id: resource_id.clone(),
        reason: e.to_string(),
    })?;

    let mut full_bytes = Vec::with_capacity(HEADER_LEN + value_bytes.len());
    full_bytes.extend_from_slice(&nanos.to_le_bytes());
    full_bytes.extend_from_slice(&value_bytes);
    Ok(full_bytes)
}

#[async_trait]
impl CacheStore for LmdbCacheStore {
    async fn get(&self, resource_id: &ResourceId) -> Option<CacheEntry> {
        match self.raw(resource_id) {
            Ok(Some(bytes)) => match decode(resource_id, &bytes) {
                Ok(entry) => {
                    self.stats.hit();
                    Some(entry)
                }
                Err(reason) => {
                    self.stats.corrupt();
                    warn!(resource = %resource_id, reason = %reason, "Cached entry unreadable, treating as absent");
                    None
                }
            },
            Ok(None) => {
                self.stats.miss();
                None
            }
            Err(e) => {
                self.stats.corrupt();
                warn!(resource = %resource_id, error = %e, "LMDB read failed, treating as absent");
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
        let full_bytes = encode(resource_id, &payload, acquired_at)?;

        let result = (|| -> Result<(), LmdbStoreError> {
            let mut wtxn = self
                .env
                .write_txn()
                .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
            self.db
                .put(&mut wtxn, resource_id.as_str().as_bytes(), &full_bytes)
                .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
            wtxn.commit()
                .map_err(|e| LmdbStoreError::Transaction(e.to_string()))
        })();

        self.stats.write(result.is_ok());
        result?;
        Ok(CacheEntry::new(resource_id.clone(), payload, acquired_at))
    }

    async fn metadata(&self, resource_id: &ResourceId) -> EntryMetadata {
        match self.raw(resource_id) {
            Ok(Some(bytes)) => match decode(resource_id, &bytes) {
                Ok(entry) => EntryMetadata::present(entry.acquired_at, bytes.len() as u64),
                Err(_) => EntryMetadata::absent(),
            },
            _ => EntryMetadata::absent(),
        }
    }

    async fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    fn backend_name(&self) -> &'static str {
        "lmdb"
    }
}
