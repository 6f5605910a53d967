//! warmcache API - HTTP adapter for the refresh-ahead cache
//!
//! This crate exposes the [`RefreshCoordinator`](warmcache_refresh::RefreshCoordinator)
//! over HTTP (Axum), loads the resource catalog, and provides the acquisition
//! collaborators that reach the external scrapers. The `warmcache` binary
//! wires these together with a staggered pre-warm job.

pub mod catalog;
pub mod config;
pub mod constants;
pub mod error;
pub mod jobs;
pub mod providers;
pub mod routes;
pub mod state;
pub mod telemetry;

// Re-export commonly used types
pub use catalog::{Catalog, ResourceSpec, SourceSpec};
pub use config::{ServerConfig, StoreBackend};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use jobs::{prewarm_task, PrewarmConfig, PrewarmMetrics};
pub use providers::{CommandAcquirer, HttpJsonAcquirer, InstrumentedAcquirer};
pub use routes::create_router;
pub use state::{open_store, AppState};
