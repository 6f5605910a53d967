use std::fmt;
use std::sync::Arc;

use warmcache_core::{Acquirer, ResourceId, SharedAcquirer, StalenessPolicy};

/// Static configuration for one cacheable resource.
#[derive(Clone)]
pub struct ResourceDescriptor {
    pub id: ResourceId,
    pub policy: StalenessPolicy,
    pub acquirer: SharedAcquirer,
    pub description: Option<String>,
}

impl ResourceDescriptor {
    pub fn new(id: ResourceId, policy: StalenessPolicy, acquirer: SharedAcquirer) -> Self {
        Self {
            id,
            policy,
            acquirer,
            description: None,
        }
    }

    /// Build from a concrete acquirer without the caller wrapping it.
    pub fn with_acquirer<A>(id: ResourceId, policy: StalenessPolicy, acquirer: A) -> Self
    where
        A: Acquirer + 'static,
    {
        Self::new(id, policy, Arc::new(acquirer))
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl fmt::Debug for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceDescriptor")
            .field("id", &self.id)
            .field("policy", &self.policy)
            .field("acquirer", &self.acquirer.kind())
            .field("description", &self.description)
            .finish()
    }
}
