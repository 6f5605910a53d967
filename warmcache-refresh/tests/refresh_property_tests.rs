//! Property-Based Tests for the refresh coordinator
//!
//! **Property 1: Fresh reads are free.** For any TTL and any read time inside
//! it, repeated reads return the stored payload with `cache_valid = true`
//! and never call the acquirer.
//!
//! **Property 2: Stale reads never claim validity.** For any read time at or
//! past the TTL, the read reports `cache_valid = false` and starts exactly
//! one background acquisition.
//!
//! **Property 3: Forced refresh acquires exactly once**, whatever the state
//! of the entry.

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use tokio::runtime::Runtime;
use warmcache_core::{Payload, StalenessPolicy};
use warmcache_refresh::{RefreshCoordinator, RefreshRegistry, ResourceDescriptor};
use warmcache_storage::{CacheStore, InMemoryCacheStore};
use warmcache_test_utils::fixtures::t0;
use warmcache_test_utils::generators::{arb_payload, arb_resource_id, arb_ttl};
use warmcache_test_utils::{CountingAcquirer, ManualClock, ResourceId};

// ============================================================================
// TEST CONFIGURATION
// ============================================================================

fn test_runtime() -> Result<Runtime, TestCaseError> {
    Runtime::new().map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

struct Harness {
    coordinator: RefreshCoordinator,
    acquirer: Arc<CountingAcquirer>,
    clock: Arc<ManualClock>,
}

async fn harness(
    id: &ResourceId,
    ttl: Duration,
    seeded: Option<Payload>,
    replacement: Payload,
) -> Result<Harness, TestCaseError> {
    let store = Arc::new(InMemoryCacheStore::new());
    if let Some(payload) = seeded {
        store
            .put(id, payload, t0())
            .await
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
    }
    let acquirer = CountingAcquirer::returning(replacement).shared();
    let clock = ManualClock::shared(t0());
    let coordinator = RefreshCoordinator::new(
        store,
        RefreshRegistry::shared(),
        clock.clone(),
        vec![ResourceDescriptor::new(
            id.clone(),
            StalenessPolicy::max_age(ttl),
            acquirer.clone(),
        )],
    )
    .map_err(|e| TestCaseError::fail(e.to_string()))?;

    Ok(Harness {
        coordinator,
        acquirer,
        clock,
    })
}

// ============================================================================
// PROPERTY TESTS
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_fresh_reads_never_acquire(
        id in arb_resource_id(),
        ttl in arb_ttl(),
        seeded in arb_payload(),
        fraction in 0.0f64..1.0,
        reads in 1usize..8,
    ) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let h = harness(&id, ttl, Some(seeded.clone()), Payload::Null).await?;
            let elapsed = (ttl.as_secs() as f64 * fraction) as i64;
            h.clock.set(t0() + chrono::Duration::seconds(elapsed.min(ttl.as_secs() as i64 - 1)));

            for _ in 0..reads {
                let served = h.coordinator.read(&id).await
                    .map_err(|e| TestCaseError::fail(e.to_string()))?;
                prop_assert_eq!(&served.payload, &seeded);
                prop_assert!(served.cache_valid);
                prop_assert!(served.from_cache);
                prop_assert!(!served.refreshing_in_background);
            }
            prop_assert_eq!(h.acquirer.calls(), 0);
            Ok(())
        })?;
    }

    #[test]
    fn prop_stale_reads_are_flagged_and_refresh_once(
        id in arb_resource_id(),
        ttl in arb_ttl(),
        seeded in arb_payload(),
        replacement in arb_payload(),
        overshoot in 0i64..(90 * 24 * 3600),
        reads in 1usize..8,
    ) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let h = harness(&id, ttl, Some(seeded.clone()), replacement.clone()).await?;
            h.clock.set(t0() + chrono::Duration::seconds(ttl.as_secs() as i64 + overshoot));

            for _ in 0..reads {
                let served = h.coordinator.read(&id).await
                    .map_err(|e| TestCaseError::fail(e.to_string()))?;
                prop_assert_eq!(&served.payload, &seeded);
                prop_assert!(!served.cache_valid);
                prop_assert!(served.refreshing_in_background);
            }
            h.coordinator.registry().wait_idle(&id).await;
            prop_assert_eq!(h.acquirer.calls(), 1);

            let served = h.coordinator.read(&id).await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert_eq!(&served.payload, &replacement);
            prop_assert!(served.cache_valid);
            Ok(())
        })?;
    }

    #[test]
    fn prop_force_refresh_acquires_exactly_once(
        id in arb_resource_id(),
        ttl in arb_ttl(),
        seeded in proptest::option::of(arb_payload()),
        replacement in arb_payload(),
        elapsed in 0i64..(60 * 24 * 3600),
    ) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let h = harness(&id, ttl, seeded, replacement.clone()).await?;
            h.clock.set(t0() + chrono::Duration::seconds(elapsed));

            let served = h.coordinator.force_refresh(&id).await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert!(served.forced);
            prop_assert!(!served.from_cache);
            prop_assert_eq!(&served.payload, &replacement);
            prop_assert_eq!(h.acquirer.calls(), 1);

            let status = h.coordinator.status(&id).await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert!(status.valid);
            prop_assert!(!status.refreshing);
            Ok(())
        })?;
    }
}
