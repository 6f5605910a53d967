//! warmcache Test Utilities
//!
//! Centralized test infrastructure for the warmcache workspace:
//! - Scriptable acquisition stubs (counting, failing, panicking, gated)
//! - A manually driven clock
//! - Proptest generators
//! - Test fixtures and assertions

// Re-export the in-memory store from its source crate
pub use warmcache_storage::InMemoryCacheStore;

// Re-export core types for convenience
pub use warmcache_core::{
    AcquireError, Acquirer, CacheEntry, Clock, Payload, RefreshError, ResourceId, SharedAcquirer,
    SharedClock, StalenessPolicy, Timestamp,
};

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{watch, Semaphore};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// ACQUISITION STUBS
// ============================================================================

/// Call-counting acquirer with a scripted sequence of outcomes.
///
/// Outcomes are consumed in order; the last one repeats once the script is
/// exhausted. Tracks the highest number of overlapping calls so tests can
/// assert that acquisitions for a resource never ran concurrently.
#[derive(Debug)]
pub struct CountingAcquirer {
    script: Mutex<VecDeque<Result<Payload, String>>>,
    last: Mutex<Result<Payload, String>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl CountingAcquirer {
    /// Always return `payload`.
    pub fn returning(payload: Payload) -> Self {
        Self::scripted(vec![Ok(payload)])
    }

    /// Return each payload in turn.
    pub fn sequence(payloads: Vec<Payload>) -> Self {
        Self::scripted(payloads.into_iter().map(Ok).collect())
    }

    /// Return each outcome in turn; `Err(reason)` becomes `AcquireError::Failed`.
    pub fn scripted(outcomes: Vec<Result<Payload, String>>) -> Self {
        let last = outcomes
            .last()
            .cloned()
            .unwrap_or_else(|| Ok(Payload::Null));
        Self {
            script: Mutex::new(outcomes.into()),
            last: Mutex::new(last),
            delay: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Sleep this long inside every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Number of calls started so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_outcome(&self) -> Result<Payload, String> {
        match lock(&self.script).pop_front() {
            Some(outcome) => {
                *lock(&self.last) = outcome.clone();
                outcome
            }
            None => lock(&self.last).clone(),
        }
    }
}

#[async_trait]
impl Acquirer for CountingAcquirer {
    async fn acquire(&self, resource_id: &ResourceId) -> Result<Payload, AcquireError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let outcome = self.next_outcome();

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome.map_err(|reason| AcquireError::failed(resource_id, reason))
    }

    fn kind(&self) -> &'static str {
        "counting"
    }
}

/// Acquirer that always fails.
#[derive(Debug)]
pub struct FailingAcquirer {
    reason: String,
    calls: AtomicUsize,
}

impl FailingAcquirer {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Acquirer for FailingAcquirer {
    async fn acquire(&self, resource_id: &ResourceId) -> Result<Payload, AcquireError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(AcquireError::failed(resource_id, self.reason.clone()))
    }

    fn kind(&self) -> &'static str {
        "failing"
    }
}

/// Acquirer that panics on every call.
#[derive(Debug, Default)]
pub struct PanickingAcquirer {
    calls: AtomicUsize,
}

impl PanickingAcquirer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Acquirer for PanickingAcquirer {
    async fn acquire(&self, resource_id: &ResourceId) -> Result<Payload, AcquireError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        panic!("acquisition of {} blew up", resource_id);
    }

    fn kind(&self) -> &'static str {
        "panicking"
    }
}

/// Acquirer that parks every call until the test releases it.
///
/// Used to hold a refresh in flight while other operations race against it.
#[derive(Debug)]
pub struct GatedAcquirer {
    payload: Mutex<Payload>,
    fail: AtomicBool,
    gate: Semaphore,
    entered: watch::Sender<usize>,
}

impl GatedAcquirer {
    pub fn new(payload: Payload) -> Self {
        let (entered, _) = watch::channel(0);
        Self {
            payload: Mutex::new(payload),
            fail: AtomicBool::new(false),
            gate: Semaphore::new(0),
            entered,
        }
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Let one parked (or future) call complete.
    pub fn release(&self) {
        self.gate.add_permits(1);
    }

    /// Payload returned by calls released from now on.
    pub fn set_payload(&self, payload: Payload) {
        *lock(&self.payload) = payload;
    }

    /// Make released calls fail instead of returning the payload.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Number of calls that have entered the acquirer.
    pub fn calls(&self) -> usize {
        *self.entered.borrow()
    }

    /// Wait until at least `n` calls have entered the acquirer.
    pub async fn wait_for_calls(&self, n: usize) {
        let mut rx = self.entered.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|count| *count >= n).await;
    }
}

#[async_trait]
impl Acquirer for GatedAcquirer {
    async fn acquire(&self, resource_id: &ResourceId) -> Result<Payload, AcquireError> {
        self.entered.send_modify(|count| *count += 1);

        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| AcquireError::failed(resource_id, "gate closed"))?;
        permit.forget();

        if self.fail.load(Ordering::SeqCst) {
            return Err(AcquireError::failed(resource_id, "gated failure"));
        }
        Ok(lock(&self.payload).clone())
    }

    fn kind(&self) -> &'static str {
        "gated"
    }
}

// ============================================================================
// MANUAL CLOCK
// ============================================================================

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn shared(start: Timestamp) -> Arc<Self> {
        Arc::new(Self::new(start))
    }

    pub fn set(&self, to: Timestamp) {
        *lock(&self.now) = to;
    }

    pub fn advance(&self, by: chrono::Duration) {
        *lock(&self.now) += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *lock(&self.now)
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for warmcache types.

    use super::*;
    use proptest::prelude::*;

    /// Generate a valid ResourceId.
    pub fn arb_resource_id() -> impl Strategy<Value = ResourceId> {
        "[a-z0-9][a-z0-9_-]{0,31}".prop_filter_map("valid resource id", |s| ResourceId::new(s).ok())
    }

    /// Generate a Timestamp within 2020-2030.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(chrono::Utc::now)
        })
    }

    /// Generate a TTL between one minute and thirty days.
    pub fn arb_ttl() -> impl Strategy<Value = Duration> {
        (60u64..(30 * 24 * 3600)).prop_map(Duration::from_secs)
    }

    /// Generate a JSON payload shaped like scraped data.
    pub fn arb_payload() -> impl Strategy<Value = Payload> {
        let leaf = prop_oneof![
            Just(Payload::Null),
            any::<bool>().prop_map(Payload::from),
            any::<i64>().prop_map(Payload::from),
            "[ -~]{0,24}".prop_map(Payload::from),
        ];
        leaf.prop_recursive(3, 32, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Payload::Array),
                prop::collection::btree_map("[a-z_]{1,10}", inner, 0..6)
                    .prop_map(|m| Payload::Object(m.into_iter().collect())),
            ]
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common scenarios.

    use super::*;
    use chrono::TimeZone;

    /// Parse a resource id known to be valid.
    pub fn resource_id(value: &str) -> ResourceId {
        match ResourceId::new(value) {
            Ok(id) => id,
            Err(e) => panic!("fixture resource id {value:?} is invalid: {e}"),
        }
    }

    /// Fixed reference instant used as T0 in scenarios.
    pub fn t0() -> Timestamp {
        chrono::Utc
            .with_ymd_and_hms(2025, 3, 10, 6, 0, 0)
            .single()
            .unwrap_or_else(chrono::Utc::now)
    }

    /// A recognizable payload tagged with `version`.
    pub fn payload(version: &str) -> Payload {
        serde_json::json!({
            "version": version,
            "items": [
                {"name": "item-a", "value": 1},
                {"name": "item-b", "value": 2},
            ],
        })
    }

    pub fn entry(id: &str, version: &str, acquired_at: Timestamp) -> CacheEntry {
        CacheEntry::new(resource_id(id), payload(version), acquired_at)
    }

    /// An in-memory store seeded with the given entries.
    pub fn seeded_store(entries: Vec<CacheEntry>) -> Arc<InMemoryCacheStore> {
        let store = InMemoryCacheStore::new();
        for entry in entries {
            if let Err(e) = store.insert(entry) {
                panic!("seeding in-memory store failed: {e}");
            }
        }
        Arc::new(store)
    }

    pub const HOUR: i64 = 3600;
    pub const DAY_SECS: u64 = 24 * 3600;
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for warmcache-specific results.

    use super::*;

    /// Assert that a result is a cold-path acquisition failure.
    #[track_caller]
    pub fn assert_cold_failure<T: std::fmt::Debug>(result: &Result<T, RefreshError>) {
        match result {
            Err(RefreshError::ColdAcquisitionFailed { .. }) => {}
            other => panic!("Expected ColdAcquisitionFailed, got: {:?}", other),
        }
    }

    /// Assert that a result is a forced refresh failure.
    #[track_caller]
    pub fn assert_forced_failure<T: std::fmt::Debug>(result: &Result<T, RefreshError>) {
        match result {
            Err(RefreshError::ForcedRefreshFailed { .. }) => {}
            other => panic!("Expected ForcedRefreshFailed, got: {:?}", other),
        }
    }

    /// Assert that a result reports an unknown resource.
    #[track_caller]
    pub fn assert_unknown_resource<T: std::fmt::Debug>(result: &Result<T, RefreshError>) {
        match result {
            Err(RefreshError::UnknownResource { .. }) => {}
            other => panic!("Expected UnknownResource, got: {:?}", other),
        }
    }
}
