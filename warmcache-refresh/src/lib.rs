//! warmcache Refresh - refresh-ahead coordination
//!
//! Serves every read from the persisted snapshot when one exists, refreshes
//! stale snapshots in the background, and guarantees at most one acquisition
//! per resource at a time.
//!
//! - [`RefreshRegistry`]: atomic per-resource "refresh running" flags
//! - [`RefreshCoordinator`]: cold / stale / fresh / forced state machine
//! - [`ResourceDescriptor`]: static catalog entry (id, policy, acquirer)

mod coordinator;
mod descriptor;
mod registry;
mod served;

pub use coordinator::RefreshCoordinator;
pub use descriptor::ResourceDescriptor;
pub use registry::{RefreshGuard, RefreshRegistry};
pub use served::{ResourceStatus, ServeKind, ServedPayload, WarmOutcome};
