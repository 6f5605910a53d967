//! warmcache Storage - durable cache stores
//!
//! Every backend implements [`CacheStore`]: `get` treats unreadable entries
//! as absent and `put` replaces an entry atomically.
//!
//! - [`FileCacheStore`]: one JSON document per resource, temp-file + rename
//! - [`LmdbCacheStore`]: heed/LMDB, one key per resource
//! - [`InMemoryCacheStore`]: process-local map

mod file_backend;
mod lmdb_backend;
mod memory;
mod traits;

pub use file_backend::FileCacheStore;
pub use lmdb_backend::{LmdbCacheStore, LmdbStoreError};
pub use memory::InMemoryCacheStore;
pub use traits::{CacheStats, CacheStore, SharedCacheStore};
