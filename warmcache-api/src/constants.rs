//! Constants for the warmcache API
//!
//! Defaults for every environment-driven setting live here.

// ============================================================================
// SERVER
// ============================================================================

/// Service name reported by health endpoints and logs
pub const SERVICE_NAME: &str = "warmcache";

/// Default bind address
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";

/// Default listen port
pub const DEFAULT_PORT: u16 = 5000;

// ============================================================================
// STORAGE
// ============================================================================

/// Default directory for persisted entries
pub const DEFAULT_CACHE_DIR: &str = "./cache";

/// Default LMDB map size in megabytes
pub const DEFAULT_LMDB_MAX_SIZE_MB: usize = 256;

/// Default path of the resource catalog
pub const DEFAULT_CATALOG_PATH: &str = "warmcache.toml";

// ============================================================================
// CORS
// ============================================================================

/// Default CORS max age in seconds (24 hours)
pub const DEFAULT_CORS_MAX_AGE_SECS: u64 = 86400;

// ============================================================================
// ACQUISITION
// ============================================================================

/// Default per-resource acquisition timeout (scrapes drive real browsers)
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 180;

/// Longest stderr / body excerpt carried in an acquisition error
pub const MAX_ERROR_EXCERPT_BYTES: usize = 2048;

// ============================================================================
// PRE-WARM JOB
// ============================================================================

/// Pause between resources during a pre-warm sweep
pub const DEFAULT_PREWARM_STAGGER_SECS: u64 = 5;

/// Interval between pre-warm sweeps (0 = startup sweep only)
pub const DEFAULT_PREWARM_INTERVAL_SECS: u64 = 900;
