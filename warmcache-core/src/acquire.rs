//! Acquisition capability.
//!
//! The code that actually produces a fresh payload (browser automation, HTML
//! parsing, third-party APIs) lives outside warmcache. The cache only sees it
//! through this trait: slow, fallible, and opaque.

use async_trait::async_trait;
use std::sync::Arc;

use crate::{AcquireError, Payload, ResourceId};

/// Produces a fresh payload for a resource.
///
/// Implementations are responsible for bounding their own duration; the
/// coordinator imposes no timeout.
#[async_trait]
pub trait Acquirer: Send + Sync {
    async fn acquire(&self, resource_id: &ResourceId) -> Result<Payload, AcquireError>;

    /// Short label describing the collaborator, used in logs and docs.
    fn kind(&self) -> &'static str {
        "custom"
    }
}

/// Shared acquirer handle.
pub type SharedAcquirer = Arc<dyn Acquirer>;
