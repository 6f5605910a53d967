//! Server Configuration Module
//!
//! Process-level settings (listen address, storage backend, catalog path,
//! CORS) loaded from environment variables with defaults for development.
//! The per-resource catalog lives in [`crate::catalog`].

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use warmcache_core::ConfigError;

use crate::constants::{
    DEFAULT_BIND_ADDR, DEFAULT_CACHE_DIR, DEFAULT_CATALOG_PATH, DEFAULT_CORS_MAX_AGE_SECS,
    DEFAULT_LMDB_MAX_SIZE_MB, DEFAULT_PORT,
};

// ============================================================================
// STORE BACKEND
// ============================================================================

/// Which [`CacheStore`](warmcache_storage::CacheStore) implementation to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    /// One JSON document per resource under the cache directory.
    #[default]
    File,
    /// A single LMDB environment under the cache directory.
    Lmdb,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Lmdb => "lmdb",
        }
    }
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "lmdb" => Ok(Self::Lmdb),
            other => Err(ConfigError::InvalidValue {
                field: "WARMCACHE_BACKEND".to_string(),
                value: other.to_string(),
                reason: "expected 'file' or 'lmdb'".to_string(),
            }),
        }
    }
}

// ============================================================================
// SERVER CONFIGURATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,
    pub cache_dir: PathBuf,
    pub backend: StoreBackend,
    pub lmdb_max_size_mb: usize,
    /// Path of the TOML resource catalog.
    pub catalog_path: PathBuf,
    /// Allowed CORS origins. Empty means allow all origins (dev mode).
    pub cors_origins: Vec<String>,
    pub cors_max_age_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            port: DEFAULT_PORT,
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            backend: StoreBackend::File,
            lmdb_max_size_mb: DEFAULT_LMDB_MAX_SIZE_MB,
            catalog_path: PathBuf::from(DEFAULT_CATALOG_PATH),
            cors_origins: Vec::new(),
            cors_max_age_secs: DEFAULT_CORS_MAX_AGE_SECS,
        }
    }
}

impl ServerConfig {
    /// Create ServerConfig from environment variables.
    ///
    /// Environment variables:
    /// - `WARMCACHE_BIND`: Bind address (default: 0.0.0.0)
    /// - `PORT` or `WARMCACHE_PORT`: Listen port (default: 5000)
    /// - `WARMCACHE_CACHE_DIR`: Directory for persisted entries (default: ./cache)
    /// - `WARMCACHE_BACKEND`: "file" or "lmdb" (default: file)
    /// - `WARMCACHE_LMDB_MAX_SIZE_MB`: LMDB map size (default: 256)
    /// - `WARMCACHE_RESOURCES`: Resource catalog path (default: warmcache.toml)
    /// - `WARMCACHE_CORS_ORIGINS`: Comma-separated allowed origins (empty = allow all)
    /// - `WARMCACHE_CORS_MAX_AGE_SECS`: Preflight cache duration (default: 86400)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_addr = non_empty("WARMCACHE_BIND").unwrap_or(defaults.bind_addr);

        let port = match non_empty("PORT").or_else(|| non_empty("WARMCACHE_PORT")) {
            Some(raw) => parse_number::<u16>("PORT", &raw)?,
            None => defaults.port,
        };

        let cache_dir = non_empty("WARMCACHE_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.cache_dir);

        let backend = match non_empty("WARMCACHE_BACKEND") {
            Some(raw) => raw.parse()?,
            None => defaults.backend,
        };

        let lmdb_max_size_mb = match non_empty("WARMCACHE_LMDB_MAX_SIZE_MB") {
            Some(raw) => parse_number::<usize>("WARMCACHE_LMDB_MAX_SIZE_MB", &raw)?,
            None => defaults.lmdb_max_size_mb,
        };
        if lmdb_max_size_mb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "WARMCACHE_LMDB_MAX_SIZE_MB".to_string(),
                value: "0".to_string(),
                reason: "must be > 0".to_string(),
            });
        }

        let catalog_path = non_empty("WARMCACHE_RESOURCES")
            .map(PathBuf::from)
            .unwrap_or(defaults.catalog_path);

        let cors_origins = lookup("WARMCACHE_CORS_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let cors_max_age_secs = match non_empty("WARMCACHE_CORS_MAX_AGE_SECS") {
            Some(raw) => parse_number::<u64>("WARMCACHE_CORS_MAX_AGE_SECS", &raw)?,
            None => defaults.cors_max_age_secs,
        };

        Ok(Self {
            bind_addr,
            port,
            cache_dir,
            backend,
            lmdb_max_size_mb,
            catalog_path,
            cors_origins,
            cors_max_age_secs,
        })
    }

    /// Resolve the listen socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_addr, self.port)
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::InvalidValue {
                field: "WARMCACHE_BIND".to_string(),
                value: self.bind_addr.clone(),
                reason: e.to_string(),
            })
    }

    /// Whether CORS is restricted to configured origins.
    pub fn is_production(&self) -> bool {
        !self.cors_origins.is_empty()
    }
}

/// Parse a numeric setting, reporting the variable name on failure.
pub(crate) fn parse_number<T>(field: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        field: field.to_string(),
        value: raw.to_string(),
        reason: e.to_string(),
    })
}
