//! In-flight refresh tracking.
//!
//! One slot per resource id, created on first use and kept for the life of
//! the process. A slot holds an atomic `running` flag and a [`Notify`] that
//! wakes tasks waiting for the in-flight refresh to finish.
//!
//! Nothing here is persisted: after a restart every resource starts idle.

use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Notify;
use warmcache_core::ResourceId;

#[derive(Debug, Default)]
struct RefreshSlot {
    running: AtomicBool,
    idle: Notify,
}

/// Per-resource mutual exclusion for acquisitions.
#[derive(Debug, Default)]
pub struct RefreshRegistry {
    /// Uses DashMap (sharded locking) for concurrent access across resources
    slots: DashMap<ResourceId, Arc<RefreshSlot>>,
}

impl RefreshRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn slot(&self, resource_id: &ResourceId) -> Arc<RefreshSlot> {
        if let Some(slot) = self.slots.get(resource_id) {
            return Arc::clone(slot.value());
        }
        let slot = self.slots.entry(resource_id.clone()).or_default();
        Arc::clone(slot.value())
    }

    /// Atomically mark `resource_id` as refreshing.
    ///
    /// Returns `true` only for the caller that flipped the flag from idle to
    /// running; that caller owns the refresh and must call [`end`](Self::end)
    /// exactly once. Prefer [`begin`](Self::begin), which releases on drop.
    pub fn try_begin(&self, resource_id: &ResourceId) -> bool {
        self.slot(resource_id)
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Clear the running flag and wake anyone waiting on it.
    pub fn end(&self, resource_id: &ResourceId) {
        let slot = match self.slots.get(resource_id) {
            Some(slot) => Arc::clone(slot.value()),
            None => return,
        };
        slot.running.store(false, Ordering::Release);
        slot.idle.notify_waiters();
    }

    /// Scoped form of [`try_begin`](Self::try_begin).
    ///
    /// The returned guard calls [`end`](Self::end) when dropped, including
    /// during unwinding and when the owning task is cancelled.
    pub fn begin(self: &Arc<Self>, resource_id: &ResourceId) -> Option<RefreshGuard> {
        if self.try_begin(resource_id) {
            Some(RefreshGuard {
                registry: Arc::clone(self),
                resource_id: resource_id.clone(),
            })
        } else {
            None
        }
    }

    pub fn is_running(&self, resource_id: &ResourceId) -> bool {
        self.slots
            .get(resource_id)
            .map(|slot| slot.running.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    /// Resolve once `resource_id` is not refreshing.
    ///
    /// Returns immediately if it is idle now.
    pub async fn wait_idle(&self, resource_id: &ResourceId) {
        let slot = self.slot(resource_id);
        loop {
            // Register interest before checking the flag so a concurrent
            // `end` between the check and the await is not missed.
            let mut notified = pin!(slot.idle.notified());
            notified.as_mut().enable();
            if !slot.running.load(Ordering::Acquire) {
                return;
            }
            notified.await;
        }
    }

    /// Resource ids currently refreshing, sorted.
    pub fn running(&self) -> Vec<ResourceId> {
        let mut ids: Vec<ResourceId> = self
            .slots
            .iter()
            .filter(|slot| slot.value().running.load(Ordering::Acquire))
            .map(|slot| slot.key().clone())
            .collect();
        ids.sort();
        ids
    }
}

/// Ownership of one in-flight refresh. Releases the registry flag on drop.
#[derive(Debug)]
pub struct RefreshGuard {
    registry: Arc<RefreshRegistry>,
    resource_id: ResourceId,
}

impl RefreshGuard {
    pub fn resource_id(&self) -> &ResourceId {
        &self.resource_id
    }
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        self.registry.end(&self.resource_id);
    }
}
