//! Background Jobs
//!
//! - `prewarm`: refreshes cold or stale resources one at a time, staggered
//!
//! # Usage
//!
//! ```ignore
//! use warmcache_api::jobs::{prewarm_task, PrewarmConfig};
//! use tokio::sync::watch;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! let handle = tokio::spawn(prewarm_task(coordinator, PrewarmConfig::from_env()?, shutdown_rx));
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! ```

pub mod prewarm;

pub use prewarm::{prewarm_task, PrewarmConfig, PrewarmMetrics, PrewarmSnapshot};
