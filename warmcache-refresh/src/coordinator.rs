//! Refresh-ahead coordinator.
//!
//! Per resource the coordinator moves through:
//!
//! ```text
//! Cold --(synchronous acquire)--> Fresh --(policy elapses)--> Stale
//! Stale --(try_begin wins)--> Refreshing --(acquire completes)--> Fresh
//! Stale --(try_begin loses)--> Stale
//! ```
//!
//! Every acquisition, whichever path starts it, runs inside a spawned task
//! that owns a [`RefreshGuard`]. The task outlives the request that started
//! it, and the registry flag is released when the task finishes, fails,
//! panics or is aborted.
//!
//! A forced refresh that finds another acquisition in flight waits for it
//! and returns its result rather than running alongside it. If that
//! acquisition left no newer entry, the forced refresh acquires afterwards.

use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures_util::FutureExt;
use tracing::{debug, error, info, warn};
use warmcache_core::{
    AcquireError, Acquirer, CacheEntry, ConfigError, Payload, RefreshError, ResourceId,
    SharedAcquirer, SharedClock, StalenessPolicy, StorageError, Timestamp,
};
use warmcache_storage::SharedCacheStore;

use crate::descriptor::ResourceDescriptor;
use crate::registry::{RefreshGuard, RefreshRegistry};
use crate::served::{ResourceStatus, ServedPayload, WarmOutcome};

/// Orchestrates cold, background and forced acquisitions over a store.
pub struct RefreshCoordinator {
    store: SharedCacheStore,
    registry: Arc<RefreshRegistry>,
    clock: SharedClock,
    descriptors: Vec<ResourceDescriptor>,
    index: HashMap<ResourceId, usize>,
}

impl fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("store", &self.store.backend_name())
            .field("resources", &self.index.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl RefreshCoordinator {
    /// Build a coordinator over a fixed catalog.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if two descriptors share an id.
    pub fn new(
        store: SharedCacheStore,
        registry: Arc<RefreshRegistry>,
        clock: SharedClock,
        descriptors: Vec<ResourceDescriptor>,
    ) -> Result<Self, ConfigError> {
        let mut index = HashMap::with_capacity(descriptors.len());
        for (position, descriptor) in descriptors.iter().enumerate() {
            if index.insert(descriptor.id.clone(), position).is_some() {
                return Err(ConfigError::InvalidValue {
                    field: "resource.id".to_string(),
                    value: descriptor.id.to_string(),
                    reason: "duplicate resource id".to_string(),
                });
            }
        }

        Ok(Self {
            store,
            registry,
            clock,
            descriptors,
            index,
        })
    }

    /// The catalog, in configuration order.
    pub fn descriptors(&self) -> &[ResourceDescriptor] {
        &self.descriptors
    }

    pub fn descriptor(&self, resource_id: &ResourceId) -> Result<&ResourceDescriptor, RefreshError> {
        self.index
            .get(resource_id)
            .map(|&position| &self.descriptors[position])
            .ok_or_else(|| RefreshError::UnknownResource {
                resource_id: resource_id.clone(),
            })
    }

    pub fn store(&self) -> &SharedCacheStore {
        &self.store
    }

    pub fn registry(&self) -> &Arc<RefreshRegistry> {
        &self.registry
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    // ------------------------------------------------------------------
    // Read path
    // ------------------------------------------------------------------

    /// Serve the current payload for a resource.
    ///
    /// - Cold: acquires synchronously; failure is returned to the caller.
    /// - Stale: returns the stale entry immediately and starts at most one
    ///   background refresh.
    /// - Fresh: returns the entry.
    pub async fn read(&self, resource_id: &ResourceId) -> Result<ServedPayload, RefreshError> {
        let descriptor = self.descriptor(resource_id)?;

        let Some(entry) = self.store.get(resource_id).await else {
            return self.read_cold(descriptor).await;
        };

        if descriptor.policy.is_stale(entry.acquired_at, self.clock.now()) {
            self.refresh_in_background(descriptor);
            Ok(ServedPayload::stale(entry))
        } else {
            Ok(ServedPayload::fresh(entry))
        }
    }

    async fn read_cold(&self, descriptor: &ResourceDescriptor) -> Result<ServedPayload, RefreshError> {
        let resource_id = &descriptor.id;

        let Some(guard) = self.registry.begin(resource_id) else {
            debug!(resource = %resource_id, "Cold read waiting on in-flight acquisition");
            self.registry.wait_idle(resource_id).await;
            return match self.store.get(resource_id).await {
                Some(entry) => {
                    let valid = !descriptor.policy.is_stale(entry.acquired_at, self.clock.now());
                    Ok(ServedPayload::joined(entry, valid))
                }
                None => Err(RefreshError::ColdAcquisitionFailed {
                    resource_id: resource_id.clone(),
                    source: AcquireError::failed(
                        resource_id,
                        "concurrent acquisition produced no entry",
                    ),
                }),
            };
        };

        info!(resource = %resource_id, "Cache cold, acquiring synchronously");
        match self.job(descriptor, guard, true).run_detached().await {
            JobOutcome::UpToDate(entry) => Ok(ServedPayload::fresh(entry)),
            JobOutcome::Stored(entry) => Ok(ServedPayload::acquired(
                entry.resource_id,
                entry.payload,
                entry.acquired_at,
                false,
            )),
            JobOutcome::NotStored {
                payload,
                acquired_at,
                error,
            } => {
                error!(resource = %resource_id, error = %error, "Acquired payload could not be stored, serving it uncached");
                Ok(ServedPayload::acquired(
                    resource_id.clone(),
                    payload,
                    acquired_at,
                    false,
                ))
            }
            JobOutcome::Failed(source) => Err(RefreshError::ColdAcquisitionFailed {
                resource_id: resource_id.clone(),
                source,
            }),
        }
    }

    /// Start a detached refresh unless one is already running.
    ///
    /// Returns whether a new refresh was started.
    fn refresh_in_background(&self, descriptor: &ResourceDescriptor) -> bool {
        let Some(guard) = self.registry.begin(&descriptor.id) else {
            debug!(resource = %descriptor.id, "Refresh already in flight, not starting another");
            return false;
        };

        let job = self.job(descriptor, guard, true);
        let resource_id = descriptor.id.clone();
        tokio::spawn(async move {
            match job.run().await {
                JobOutcome::Stored(entry) => {
                    info!(resource = %resource_id, acquired_at = %entry.acquired_at, "Background refresh stored new entry")
                }
                JobOutcome::UpToDate(_) => {
                    debug!(resource = %resource_id, "Background refresh found entry already fresh")
                }
                JobOutcome::NotStored { error, .. } => {
                    warn!(resource = %resource_id, error = %error, "Background refresh could not store entry, keeping previous")
                }
                JobOutcome::Failed(e) => {
                    warn!(resource = %resource_id, error = %e, "Background refresh failed, keeping previous entry")
                }
            }
        });
        true
    }

    // ------------------------------------------------------------------
    // Forced refresh
    // ------------------------------------------------------------------

    /// Acquire synchronously regardless of staleness.
    ///
    /// If an acquisition is already in flight the caller waits for it and is
    /// served its result (`joined_in_flight = true`) when it stored an entry
    /// acquired at or after the request. Otherwise (the in-flight job failed
    /// or found the entry fresh without acquiring) the caller takes the
    /// registry slot itself and acquires.
    pub async fn force_refresh(&self, resource_id: &ResourceId) -> Result<ServedPayload, RefreshError> {
        let descriptor = self.descriptor(resource_id)?;
        let requested_at = self.clock.now();

        let guard = loop {
            if let Some(guard) = self.registry.begin(resource_id) {
                break guard;
            }

            info!(resource = %resource_id, "Forced refresh waiting on in-flight acquisition");
            self.registry.wait_idle(resource_id).await;

            if let Some(entry) = self.store.get(resource_id).await {
                if entry.acquired_at >= requested_at {
                    let valid = !descriptor.policy.is_stale(entry.acquired_at, self.clock.now());
                    return Ok(ServedPayload::forced_joined(entry, valid));
                }
            }
            debug!(resource = %resource_id, "In-flight acquisition left no newer entry, acquiring");
        };

        info!(resource = %resource_id, "Forced refresh");
        match self.job(descriptor, guard, false).run_detached().await {
            JobOutcome::Stored(entry) | JobOutcome::UpToDate(entry) => Ok(ServedPayload::acquired(
                entry.resource_id,
                entry.payload,
                entry.acquired_at,
                true,
            )),
            JobOutcome::NotStored {
                payload,
                acquired_at,
                error,
            } => {
                error!(resource = %resource_id, error = %error, "Forced refresh could not store entry, serving it uncached");
                Ok(ServedPayload::acquired(
                    resource_id.clone(),
                    payload,
                    acquired_at,
                    true,
                ))
            }
            JobOutcome::Failed(source) => {
                warn!(resource = %resource_id, error = %source, "Forced refresh failed, keeping previous entry");
                Err(RefreshError::ForcedRefreshFailed {
                    resource_id: resource_id.clone(),
                    source,
                })
            }
        }
    }

    // ------------------------------------------------------------------
    // Warm-up
    // ------------------------------------------------------------------

    /// Refresh if cold or stale and wait for the result.
    pub async fn warm(&self, resource_id: &ResourceId) -> Result<WarmOutcome, RefreshError> {
        let descriptor = self.descriptor(resource_id)?;

        if let Some(entry) = self.store.get(resource_id).await {
            if !descriptor.policy.is_stale(entry.acquired_at, self.clock.now()) {
                return Ok(WarmOutcome::AlreadyFresh);
            }
        }

        let Some(guard) = self.registry.begin(resource_id) else {
            debug!(resource = %resource_id, "Warm-up skipped, refresh already in flight");
            return Ok(WarmOutcome::Skipped);
        };

        let outcome = match self.job(descriptor, guard, true).run_detached().await {
            JobOutcome::UpToDate(_) => WarmOutcome::AlreadyFresh,
            JobOutcome::Stored(_) => WarmOutcome::Refreshed,
            JobOutcome::NotStored { error, .. } => {
                warn!(resource = %resource_id, error = %error, "Warm-up could not store entry");
                WarmOutcome::NotStored(error)
            }
            JobOutcome::Failed(e) => {
                warn!(resource = %resource_id, error = %e, "Warm-up acquisition failed");
                WarmOutcome::Failed(e)
            }
        };
        Ok(outcome)
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Cache state of one resource. Never acquires.
    pub async fn status(&self, resource_id: &ResourceId) -> Result<ResourceStatus, RefreshError> {
        let descriptor = self.descriptor(resource_id)?;
        Ok(self.status_of(descriptor).await)
    }

    /// Cache state of every resource, in catalog order.
    pub async fn statuses(&self) -> Vec<ResourceStatus> {
        let mut statuses = Vec::with_capacity(self.descriptors.len());
        for descriptor in &self.descriptors {
            statuses.push(self.status_of(descriptor).await);
        }
        statuses
    }

    async fn status_of(&self, descriptor: &ResourceDescriptor) -> ResourceStatus {
        let metadata = self.store.metadata(&descriptor.id).await;
        let now = self.clock.now();
        let last_acquired = metadata.acquired_at.filter(|_| metadata.exists);

        ResourceStatus {
            resource_id: descriptor.id.clone(),
            exists: metadata.exists,
            valid: last_acquired.is_some_and(|at| !descriptor.policy.is_stale(at, now)),
            last_acquired,
            refreshing: self.registry.is_running(&descriptor.id),
            size_bytes: metadata.size_bytes,
            age_secs: last_acquired
                .map(|at| now.signed_duration_since(at).num_seconds().max(0) as u64),
            policy: descriptor.policy.to_string(),
            ttl_secs: descriptor.policy.ttl_secs(),
        }
    }

    fn job(&self, descriptor: &ResourceDescriptor, guard: RefreshGuard, recheck: bool) -> RefreshJob {
        RefreshJob {
            resource_id: descriptor.id.clone(),
            policy: descriptor.policy,
            acquirer: Arc::clone(&descriptor.acquirer),
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            recheck,
            guard,
        }
    }
}

// ============================================================================
// REFRESH JOB
// ============================================================================

enum JobOutcome {
    /// Recheck found an entry already within policy; nothing was acquired.
    UpToDate(CacheEntry),
    Stored(CacheEntry),
    NotStored {
        payload: Payload,
        acquired_at: Timestamp,
        error: StorageError,
    },
    Failed(AcquireError),
}

/// One acquisition owned by a registry guard.
struct RefreshJob {
    resource_id: ResourceId,
    policy: StalenessPolicy,
    acquirer: SharedAcquirer,
    store: SharedCacheStore,
    clock: SharedClock,
    /// Re-read the store before acquiring and skip if already fresh.
    recheck: bool,
    guard: RefreshGuard,
}

impl RefreshJob {
    async fn run(self) -> JobOutcome {
        let RefreshJob {
            resource_id,
            policy,
            acquirer,
            store,
            clock,
            recheck,
            guard: _guard,
        } = self;

        if recheck {
            if let Some(current) = store.get(&resource_id).await {
                if !policy.is_stale(current.acquired_at, clock.now()) {
                    return JobOutcome::UpToDate(current);
                }
            }
        }

        let payload = match acquire_guarded(acquirer.as_ref(), &resource_id).await {
            Ok(payload) => payload,
            Err(e) => return JobOutcome::Failed(e),
        };

        let acquired_at = clock.now();
        match store.put(&resource_id, payload.clone(), acquired_at).await {
            Ok(entry) => JobOutcome::Stored(entry),
            Err(error) => JobOutcome::NotStored {
                payload,
                acquired_at,
                error,
            },
        }
    }

    /// Run on its own task and wait for it, so the acquisition completes even
    /// if the waiting caller goes away.
    async fn run_detached(self) -> JobOutcome {
        let resource_id = self.resource_id.clone();
        match tokio::spawn(self.run()).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => JobOutcome::Failed(AcquireError::Panicked { resource_id }),
            Err(_) => JobOutcome::Failed(AcquireError::failed(&resource_id, "refresh task cancelled")),
        }
    }
}

/// Call the acquirer, turning a panic into `AcquireError::Panicked`.
async fn acquire_guarded(
    acquirer: &dyn Acquirer,
    resource_id: &ResourceId,
) -> Result<Payload, AcquireError> {
    let started = Instant::now();
    info!(resource = %resource_id, acquirer = acquirer.kind(), "Acquisition started");

    let result = AssertUnwindSafe(acquirer.acquire(resource_id))
        .catch_unwind()
        .await
        .unwrap_or_else(|_| {
            Err(AcquireError::Panicked {
                resource_id: resource_id.clone(),
            })
        });

    let duration_ms = started.elapsed().as_millis() as u64;
    match &result {
        Ok(_) => info!(resource = %resource_id, duration_ms, "Acquisition completed"),
        Err(e) => warn!(resource = %resource_id, duration_ms, error = %e, "Acquisition failed"),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;
    use warmcache_core::{Clock, EntryMetadata};
    use warmcache_storage::{CacheStats, CacheStore, InMemoryCacheStore};
    use warmcache_test_utils::assertions::{
        assert_cold_failure, assert_forced_failure, assert_unknown_resource,
    };
    use warmcache_test_utils::fixtures::{entry, payload, resource_id, seeded_store, t0};
    use warmcache_test_utils::{
        CountingAcquirer, FailingAcquirer, GatedAcquirer, ManualClock, PanickingAcquirer,
    };

    const DAY: u64 = 24 * 3600;

    fn day_policy() -> StalenessPolicy {
        StalenessPolicy::max_age(Duration::from_secs(DAY))
    }

    fn coordinator(
        store: SharedCacheStore,
        clock: Arc<ManualClock>,
        id: &str,
        acquirer: SharedAcquirer,
    ) -> RefreshCoordinator {
        RefreshCoordinator::new(
            store,
            RefreshRegistry::shared(),
            clock,
            vec![ResourceDescriptor::new(resource_id(id), day_policy(), acquirer)],
        )
        .expect("valid catalog")
    }

    /// Store whose writes always fail.
    #[derive(Debug, Default)]
    struct ReadOnlyStore;

    #[async_trait]
    impl CacheStore for ReadOnlyStore {
        async fn get(&self, _: &ResourceId) -> Option<CacheEntry> {
            None
        }

        async fn put(&self, id: &ResourceId, _: Payload, _: Timestamp) -> Result<CacheEntry, StorageError> {
            Err(StorageError::Io {
                resource_id: id.clone(),
                reason: "read-only".to_string(),
            })
        }

        async fn metadata(&self, _: &ResourceId) -> EntryMetadata {
            EntryMetadata::absent()
        }

        async fn stats(&self) -> CacheStats {
            CacheStats::default()
        }

        fn backend_name(&self) -> &'static str {
            "read-only"
        }
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let acquirer: SharedAcquirer = CountingAcquirer::returning(json!(1)).shared();
        let result = RefreshCoordinator::new(
            Arc::new(InMemoryCacheStore::new()),
            RefreshRegistry::shared(),
            ManualClock::shared(t0()),
            vec![
                ResourceDescriptor::new(resource_id("cinema"), day_policy(), Arc::clone(&acquirer)),
                ResourceDescriptor::new(resource_id("cinema"), day_policy(), acquirer),
            ],
        );
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[tokio::test]
    async fn test_unknown_resource() {
        let acquirer = CountingAcquirer::returning(json!(1)).shared();
        let coordinator = coordinator(
            Arc::new(InMemoryCacheStore::new()),
            ManualClock::shared(t0()),
            "cinema",
            acquirer.clone(),
        );

        let unknown = resource_id("weather");
        assert_unknown_resource(&coordinator.read(&unknown).await);
        assert_unknown_resource(&coordinator.force_refresh(&unknown).await);
        assert_unknown_resource(&coordinator.status(&unknown).await);
        assert_eq!(acquirer.calls(), 0);
    }

    #[tokio::test]
    async fn test_fresh_reads_never_acquire() {
        let acquirer = CountingAcquirer::returning(payload("new")).shared();
        let clock = ManualClock::shared(t0() + chrono::Duration::hours(1));
        let store = seeded_store(vec![entry("trend", "p1", t0())]);
        let coordinator = coordinator(store, clock, "trend", acquirer.clone());

        for _ in 0..5 {
            let served = coordinator.read(&resource_id("trend")).await.unwrap();
            assert_eq!(served.payload, payload("p1"));
            assert!(served.from_cache);
            assert!(served.cache_valid);
            assert!(!served.refreshing_in_background);
            assert_eq!(served.cache_date, Some(t0()));
        }
        assert_eq!(acquirer.calls(), 0);
    }

    #[tokio::test]
    async fn test_cold_read_acquires_once_then_serves_cache() {
        let acquirer = CountingAcquirer::returning(payload("p1")).shared();
        let clock = ManualClock::shared(t0());
        let coordinator = coordinator(
            Arc::new(InMemoryCacheStore::new()),
            clock.clone(),
            "cinema",
            acquirer.clone(),
        );
        let id = resource_id("cinema");

        let first = coordinator.read(&id).await.unwrap();
        assert!(!first.from_cache);
        assert!(first.cache_valid);
        assert_eq!(first.cache_date, None);
        assert_eq!(first.acquired_at, t0());
        assert_eq!(first.kind, crate::ServeKind::Cold);

        clock.advance(chrono::Duration::hours(2));
        let second = coordinator.read(&id).await.unwrap();
        assert!(second.from_cache);
        assert_eq!(second.payload, payload("p1"));
        assert_eq!(acquirer.calls(), 1);
    }

    #[tokio::test]
    async fn test_cold_failure_is_surfaced_and_nothing_stored() {
        let acquirer = Arc::new(FailingAcquirer::new("site down"));
        let store = Arc::new(InMemoryCacheStore::new());
        let coordinator = coordinator(store.clone(), ManualClock::shared(t0()), "cinema", acquirer.clone());
        let id = resource_id("cinema");

        assert_cold_failure(&coordinator.read(&id).await);
        assert!(store.get(&id).await.is_none());
        assert!(!coordinator.registry().is_running(&id));

        // The flag was released, so the next read tries again.
        assert_cold_failure(&coordinator.read(&id).await);
        assert_eq!(acquirer.calls(), 2);
    }

    #[tokio::test]
    async fn test_cold_panic_is_surfaced_and_releases_flag() {
        let acquirer = Arc::new(PanickingAcquirer::new());
        let coordinator = coordinator(
            Arc::new(InMemoryCacheStore::new()),
            ManualClock::shared(t0()),
            "cinema",
            acquirer.clone(),
        );
        let id = resource_id("cinema");

        match coordinator.read(&id).await {
            Err(RefreshError::ColdAcquisitionFailed { source, .. }) => {
                assert!(matches!(source, AcquireError::Panicked { .. }))
            }
            other => panic!("expected cold failure, got {other:?}"),
        }
        assert!(!coordinator.registry().is_running(&id));
    }

    #[tokio::test]
    async fn test_cold_store_failure_still_serves_payload() {
        let acquirer = CountingAcquirer::returning(payload("p1")).shared();
        let coordinator = coordinator(
            Arc::new(ReadOnlyStore),
            ManualClock::shared(t0()),
            "cinema",
            acquirer.clone(),
        );

        let served = coordinator.read(&resource_id("cinema")).await.unwrap();
        assert_eq!(served.payload, payload("p1"));
        assert!(!served.from_cache);
    }

    #[tokio::test]
    async fn test_stale_read_serves_old_payload_and_refreshes() {
        let acquirer = CountingAcquirer::returning(payload("p2")).shared();
        let clock = ManualClock::shared(t0() + chrono::Duration::hours(30));
        let store = seeded_store(vec![entry("trend", "p1", t0())]);
        let coordinator = coordinator(store, clock.clone(), "trend", acquirer.clone());
        let id = resource_id("trend");

        let stale = coordinator.read(&id).await.unwrap();
        assert_eq!(stale.payload, payload("p1"));
        assert!(stale.from_cache);
        assert!(!stale.cache_valid);
        assert!(stale.refreshing_in_background);

        coordinator.registry().wait_idle(&id).await;
        clock.advance(chrono::Duration::hours(1));

        let fresh = coordinator.read(&id).await.unwrap();
        assert_eq!(fresh.payload, payload("p2"));
        assert!(fresh.cache_valid);
        assert_eq!(acquirer.calls(), 1);
    }

    #[tokio::test]
    async fn test_background_failure_keeps_entry_and_releases_flag() {
        let acquirer = CountingAcquirer::scripted(vec![
            Err("selector changed".to_string()),
            Ok(payload("p2")),
        ])
        .shared();
        let clock = ManualClock::shared(t0() + chrono::Duration::hours(30));
        let store = seeded_store(vec![entry("trend", "p1", t0())]);
        let coordinator = coordinator(store, clock, "trend", acquirer.clone());
        let id = resource_id("trend");

        coordinator.read(&id).await.unwrap();
        coordinator.registry().wait_idle(&id).await;

        let after_failure = coordinator.read(&id).await.unwrap();
        assert_eq!(after_failure.payload, payload("p1"));
        assert!(!after_failure.cache_valid);

        coordinator.registry().wait_idle(&id).await;
        let after_retry = coordinator.read(&id).await.unwrap();
        assert_eq!(after_retry.payload, payload("p2"));
        assert!(after_retry.cache_valid);
        assert_eq!(acquirer.calls(), 2);
    }

    #[tokio::test]
    async fn test_background_panic_releases_flag() {
        let acquirer = Arc::new(PanickingAcquirer::new());
        let clock = ManualClock::shared(t0() + chrono::Duration::hours(30));
        let store = seeded_store(vec![entry("trend", "p1", t0())]);
        let coordinator = coordinator(store, clock, "trend", acquirer.clone());
        let id = resource_id("trend");

        coordinator.read(&id).await.unwrap();
        coordinator.registry().wait_idle(&id).await;
        assert!(!coordinator.registry().is_running(&id));

        let served = coordinator.read(&id).await.unwrap();
        assert_eq!(served.payload, payload("p1"));
        coordinator.registry().wait_idle(&id).await;
        assert_eq!(acquirer.calls(), 2);
    }

    #[tokio::test]
    async fn test_stale_reads_while_refreshing_do_not_spawn_more() {
        let acquirer = GatedAcquirer::new(payload("p2")).shared();
        let clock = ManualClock::shared(t0() + chrono::Duration::hours(30));
        let store = seeded_store(vec![entry("trend", "p1", t0())]);
        let coordinator = coordinator(store, clock, "trend", acquirer.clone());
        let id = resource_id("trend");

        for _ in 0..10 {
            let served = coordinator.read(&id).await.unwrap();
            assert_eq!(served.payload, payload("p1"));
            assert!(served.refreshing_in_background);
        }
        acquirer.wait_for_calls(1).await;
        assert!(coordinator.registry().is_running(&id));

        acquirer.release();
        coordinator.registry().wait_idle(&id).await;
        assert_eq!(acquirer.calls(), 1);
    }

    #[tokio::test]
    async fn test_force_refresh_acquires_even_when_fresh() {
        let acquirer = CountingAcquirer::returning(payload("p2")).shared();
        let clock = ManualClock::shared(t0() + chrono::Duration::minutes(5));
        let store = seeded_store(vec![entry("events", "p1", t0())]);
        let coordinator = coordinator(store, clock.clone(), "events", acquirer.clone());
        let id = resource_id("events");

        let forced = coordinator.force_refresh(&id).await.unwrap();
        assert!(forced.forced);
        assert!(!forced.from_cache);
        assert!(forced.cache_valid);
        assert_eq!(forced.payload, payload("p2"));
        assert_eq!(forced.acquired_at, clock.now());
        assert_eq!(acquirer.calls(), 1);

        let read = coordinator.read(&id).await.unwrap();
        assert_eq!(read.payload, payload("p2"));
        assert_eq!(acquirer.calls(), 1);
    }

    #[tokio::test]
    async fn test_force_refresh_failure_keeps_entry() {
        let acquirer = Arc::new(FailingAcquirer::new("timeout"));
        let store = seeded_store(vec![entry("events", "p1", t0())]);
        let coordinator = coordinator(store, ManualClock::shared(t0()), "events", acquirer);
        let id = resource_id("events");

        assert_forced_failure(&coordinator.force_refresh(&id).await);
        assert!(!coordinator.registry().is_running(&id));
        assert_eq!(coordinator.read(&id).await.unwrap().payload, payload("p1"));
    }

    #[tokio::test]
    async fn test_force_refresh_joins_in_flight_refresh() {
        let acquirer = GatedAcquirer::new(payload("p2")).shared();
        let clock = ManualClock::shared(t0() + chrono::Duration::hours(30));
        let store = seeded_store(vec![entry("trend", "p1", t0())]);
        let coordinator = Arc::new(coordinator(store, clock, "trend", acquirer.clone()));
        let id = resource_id("trend");

        coordinator.read(&id).await.unwrap();
        acquirer.wait_for_calls(1).await;

        let forced = {
            let coordinator = Arc::clone(&coordinator);
            let id = id.clone();
            tokio::spawn(async move { coordinator.force_refresh(&id).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!forced.is_finished());

        acquirer.release();
        let served = forced.await.unwrap().unwrap();
        assert!(served.forced);
        assert!(served.joined_in_flight);
        assert_eq!(served.payload, payload("p2"));
        assert_eq!(acquirer.calls(), 1);
    }

    #[tokio::test]
    async fn test_force_refresh_acquires_after_joined_refresh_fails() {
        let acquirer = GatedAcquirer::new(payload("p2")).shared();
        acquirer.set_failing(true);
        let clock = ManualClock::shared(t0() + chrono::Duration::hours(30));
        let store = seeded_store(vec![entry("trend", "p1", t0())]);
        let coordinator = Arc::new(coordinator(store, clock, "trend", acquirer.clone()));
        let id = resource_id("trend");

        coordinator.read(&id).await.unwrap();
        acquirer.wait_for_calls(1).await;

        let forced = {
            let coordinator = Arc::clone(&coordinator);
            let id = id.clone();
            tokio::spawn(async move { coordinator.force_refresh(&id).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        acquirer.release();

        // The background call failed; the forced refresh now runs its own.
        acquirer.wait_for_calls(2).await;
        acquirer.set_failing(false);
        acquirer.release();

        let served = forced.await.unwrap().unwrap();
        assert!(served.forced);
        assert!(!served.joined_in_flight);
        assert_eq!(served.payload, payload("p2"));
        assert_eq!(acquirer.calls(), 2);
    }

    #[tokio::test]
    async fn test_force_refresh_failure_after_joined_failure_is_reported() {
        let acquirer = GatedAcquirer::new(payload("p2")).shared();
        acquirer.set_failing(true);
        let clock = ManualClock::shared(t0() + chrono::Duration::hours(30));
        let store = seeded_store(vec![entry("trend", "p1", t0())]);
        let coordinator = Arc::new(coordinator(store, clock, "trend", acquirer.clone()));
        let id = resource_id("trend");

        coordinator.read(&id).await.unwrap();
        acquirer.wait_for_calls(1).await;

        let forced = {
            let coordinator = Arc::clone(&coordinator);
            let id = id.clone();
            tokio::spawn(async move { coordinator.force_refresh(&id).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        acquirer.release();
        acquirer.release();

        assert_forced_failure(&forced.await.unwrap());
        assert_eq!(acquirer.calls(), 2);
        assert!(!coordinator.registry().is_running(&id));
    }

    /// In-memory store that parks one chosen `get` call until released.
    struct HeldReadStore {
        inner: InMemoryCacheStore,
        hold_call: usize,
        gets: std::sync::atomic::AtomicUsize,
        held: tokio::sync::Notify,
        gate: tokio::sync::Semaphore,
    }

    impl HeldReadStore {
        fn holding(hold_call: usize) -> Self {
            Self {
                inner: InMemoryCacheStore::new(),
                hold_call,
                gets: std::sync::atomic::AtomicUsize::new(0),
                held: tokio::sync::Notify::new(),
                gate: tokio::sync::Semaphore::new(0),
            }
        }
    }

    #[async_trait]
    impl CacheStore for HeldReadStore {
        async fn get(&self, id: &ResourceId) -> Option<CacheEntry> {
            let call = self.gets.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
            if call == self.hold_call {
                self.held.notify_one();
                if let Ok(permit) = self.gate.acquire().await {
                    permit.forget();
                }
            }
            self.inner.get(id).await
        }

        async fn put(&self, id: &ResourceId, payload: Payload, at: Timestamp) -> Result<CacheEntry, StorageError> {
            self.inner.put(id, payload, at).await
        }

        async fn metadata(&self, id: &ResourceId) -> EntryMetadata {
            self.inner.metadata(id).await
        }

        async fn stats(&self) -> CacheStats {
            self.inner.stats().await
        }

        fn backend_name(&self) -> &'static str {
            "held-read"
        }
    }

    #[tokio::test]
    async fn test_force_refresh_acquires_when_joined_job_found_entry_fresh() {
        // Second get is the cold job's recheck.
        let store = Arc::new(HeldReadStore::holding(2));
        let acquirer = CountingAcquirer::returning(payload("forced")).shared();
        let clock = ManualClock::shared(t0());
        let coordinator = Arc::new(coordinator(store.clone(), clock.clone(), "cinema", acquirer.clone()));
        let id = resource_id("cinema");

        let cold = {
            let coordinator = Arc::clone(&coordinator);
            let id = id.clone();
            tokio::spawn(async move { coordinator.read(&id).await })
        };
        store.held.notified().await;

        // Another writer lands a fresh entry while the recheck is parked.
        store.inner.insert(entry("cinema", "other", t0())).unwrap();
        clock.advance(chrono::Duration::seconds(1));

        let forced = {
            let coordinator = Arc::clone(&coordinator);
            let id = id.clone();
            tokio::spawn(async move { coordinator.force_refresh(&id).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!forced.is_finished());

        store.gate.add_permits(1);

        let cold = cold.await.unwrap().unwrap();
        assert_eq!(cold.payload, payload("other"));

        let served = forced.await.unwrap().unwrap();
        assert!(served.forced);
        assert!(!served.joined_in_flight);
        assert_eq!(served.payload, payload("forced"));
        assert_eq!(served.acquired_at, t0() + chrono::Duration::seconds(1));
        assert_eq!(acquirer.calls(), 1);
        assert!(!coordinator.registry().is_running(&id));
    }

    #[tokio::test]
    async fn test_status_never_acquires() {
        let acquirer = CountingAcquirer::returning(payload("p2")).shared();
        let clock = ManualClock::shared(t0() + chrono::Duration::hours(30));
        let store = seeded_store(vec![entry("trend", "p1", t0())]);
        let coordinator = coordinator(store, clock, "trend", acquirer.clone());

        let status = coordinator.status(&resource_id("trend")).await.unwrap();
        assert!(status.exists);
        assert!(!status.valid);
        assert!(!status.refreshing);
        assert_eq!(status.last_acquired, Some(t0()));
        assert_eq!(status.age_secs, Some(30 * 3600));
        assert_eq!(status.ttl_secs, Some(DAY));
        assert_eq!(status.policy, "max-age 86400s");
        assert_eq!(acquirer.calls(), 0);
    }

    #[tokio::test]
    async fn test_statuses_follow_catalog_order() {
        let acquirer: SharedAcquirer = CountingAcquirer::returning(json!(1)).shared();
        let coordinator = RefreshCoordinator::new(
            seeded_store(vec![entry("events", "p1", t0())]),
            RefreshRegistry::shared(),
            ManualClock::shared(t0()),
            vec![
                ResourceDescriptor::new(resource_id("cinema"), day_policy(), Arc::clone(&acquirer)),
                ResourceDescriptor::new(resource_id("events"), day_policy(), acquirer),
            ],
        )
        .unwrap();

        let statuses = coordinator.statuses().await;
        let ids: Vec<_> = statuses.iter().map(|s| s.resource_id.as_str()).collect();
        assert_eq!(ids, ["cinema", "events"]);
        assert!(!statuses[0].exists);
        assert!(statuses[1].valid);
    }

    #[tokio::test]
    async fn test_warm_outcomes() {
        let acquirer = CountingAcquirer::scripted(vec![Ok(payload("p1")), Err("down".into())]).shared();
        let clock = ManualClock::shared(t0());
        let coordinator = coordinator(
            Arc::new(InMemoryCacheStore::new()),
            clock.clone(),
            "cinema",
            acquirer.clone(),
        );
        let id = resource_id("cinema");

        assert_eq!(coordinator.warm(&id).await.unwrap(), WarmOutcome::Refreshed);
        assert_eq!(coordinator.warm(&id).await.unwrap(), WarmOutcome::AlreadyFresh);

        clock.advance(chrono::Duration::hours(25));
        assert!(matches!(
            coordinator.warm(&id).await.unwrap(),
            WarmOutcome::Failed(AcquireError::Failed { .. })
        ));
        assert_eq!(acquirer.calls(), 2);
    }

    #[tokio::test]
    async fn test_warm_skips_when_refresh_in_flight() {
        let acquirer = GatedAcquirer::new(payload("p2")).shared();
        let clock = ManualClock::shared(t0() + chrono::Duration::hours(30));
        let store = seeded_store(vec![entry("trend", "p1", t0())]);
        let coordinator = coordinator(store, clock, "trend", acquirer.clone());
        let id = resource_id("trend");

        coordinator.read(&id).await.unwrap();
        assert_eq!(coordinator.warm(&id).await.unwrap(), WarmOutcome::Skipped);

        acquirer.release();
        coordinator.registry().wait_idle(&id).await;
    }

    #[tokio::test]
    async fn test_warm_reports_store_failure() {
        let acquirer = CountingAcquirer::returning(payload("p1")).shared();
        let coordinator = coordinator(Arc::new(ReadOnlyStore), ManualClock::shared(t0()), "cinema", acquirer);

        assert!(matches!(
            coordinator.warm(&resource_id("cinema")).await.unwrap(),
            WarmOutcome::NotStored(StorageError::Io { .. })
        ));
    }
}
