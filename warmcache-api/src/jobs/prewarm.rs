//! Pre-warm Background Task
//!
//! After a restart every resource may be stale at once, and the first reads
//! would each kick off an acquisition. This task walks the catalog at startup
//! (and then periodically), warming one resource at a time with a pause in
//! between, so acquisitions are spread out instead of bursting.
//!
//! Read-triggered refreshes keep working while it runs; the refresh registry
//! makes the two paths skip each other rather than double up.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use warmcache_core::ConfigError;
use warmcache_refresh::{RefreshCoordinator, WarmOutcome};

use crate::config::parse_number;
use crate::constants::{DEFAULT_PREWARM_INTERVAL_SECS, DEFAULT_PREWARM_STAGGER_SECS};
use crate::telemetry;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct PrewarmConfig {
    /// Run at all (default: true)
    pub enabled: bool,

    /// Pause between two resources within one sweep (default: 5 seconds)
    pub stagger: Duration,

    /// Time between sweeps. `None` runs the startup sweep only.
    /// (default: 15 minutes)
    pub interval: Option<Duration>,
}

impl Default for PrewarmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stagger: Duration::from_secs(DEFAULT_PREWARM_STAGGER_SECS),
            interval: Some(Duration::from_secs(DEFAULT_PREWARM_INTERVAL_SECS)),
        }
    }
}

impl PrewarmConfig {
    /// Create PrewarmConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `WARMCACHE_PREWARM_ENABLED`: "false" disables the job (default: true)
    /// - `WARMCACHE_PREWARM_STAGGER_SECS`: Pause between resources (default: 5)
    /// - `WARMCACHE_PREWARM_INTERVAL_SECS`: Seconds between sweeps, 0 = startup only (default: 900)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let enabled = lookup("WARMCACHE_PREWARM_ENABLED")
            .map(|s| s.trim().to_lowercase() != "false")
            .unwrap_or(true);

        let stagger_secs = match lookup("WARMCACHE_PREWARM_STAGGER_SECS") {
            Some(raw) => parse_number::<u64>("WARMCACHE_PREWARM_STAGGER_SECS", &raw)?,
            None => DEFAULT_PREWARM_STAGGER_SECS,
        };

        let interval_secs = match lookup("WARMCACHE_PREWARM_INTERVAL_SECS") {
            Some(raw) => parse_number::<u64>("WARMCACHE_PREWARM_INTERVAL_SECS", &raw)?,
            None => DEFAULT_PREWARM_INTERVAL_SECS,
        };

        Ok(Self {
            enabled,
            stagger: Duration::from_secs(stagger_secs),
            interval: (interval_secs > 0).then(|| Duration::from_secs(interval_secs)),
        })
    }

    /// Short pauses for development and tests.
    pub fn development() -> Self {
        Self {
            enabled: true,
            stagger: Duration::from_millis(100),
            interval: Some(Duration::from_secs(30)),
        }
    }
}

// ============================================================================
// METRICS
// ============================================================================

/// Counters for pre-warm activity since startup.
///
/// Per-resource outcomes are also exported as `warmcache_prewarm_checks_total`.
#[derive(Debug, Default)]
pub struct PrewarmMetrics {
    /// Completed sweeps
    pub sweeps: AtomicU64,

    /// Resources that were refreshed
    pub refreshed: AtomicU64,

    /// Resources that were already fresh
    pub already_fresh: AtomicU64,

    /// Resources skipped because a refresh was already in flight
    pub skipped: AtomicU64,

    /// Failed acquisitions or writes
    pub failures: AtomicU64,
}

impl PrewarmMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, resource: &str, outcome: &WarmOutcome) {
        if let Some(exported) = telemetry::metrics() {
            exported.record_prewarm(resource, outcome.as_str());
        }
        let counter = match outcome {
            WarmOutcome::Refreshed => &self.refreshed,
            WarmOutcome::AlreadyFresh => &self.already_fresh,
            WarmOutcome::Skipped => &self.skipped,
            WarmOutcome::Failed(_) | WarmOutcome::NotStored(_) => &self.failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current snapshot of all metrics.
    pub fn snapshot(&self) -> PrewarmSnapshot {
        PrewarmSnapshot {
            sweeps: self.sweeps.load(Ordering::Relaxed),
            refreshed: self.refreshed.load(Ordering::Relaxed),
            already_fresh: self.already_fresh.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of pre-warm metrics at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrewarmSnapshot {
    pub sweeps: u64,
    pub refreshed: u64,
    pub already_fresh: u64,
    pub skipped: u64,
    pub failures: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Warm every configured resource until shutdown is signalled.
///
/// The first sweep starts immediately. With `interval = None` the task
/// returns after it. Shutdown is honoured between resources, so an
/// acquisition already running is allowed to finish.
pub async fn prewarm_task(
    coordinator: Arc<RefreshCoordinator>,
    config: PrewarmConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<PrewarmMetrics> {
    let metrics = Arc::new(PrewarmMetrics::new());

    if !config.enabled {
        tracing::info!("Pre-warm task disabled");
        return metrics;
    }

    tracing::info!(
        stagger_secs = config.stagger.as_secs_f64(),
        interval_secs = config.interval.map(|i| i.as_secs()),
        resources = coordinator.descriptors().len(),
        "Pre-warm task started"
    );

    match config.interval {
        None => {
            sweep(&coordinator, &config, &metrics, &mut shutdown_rx).await;
        }
        Some(period) => {
            let mut sweep_interval = interval(period);
            sweep_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!("Pre-warm task shutting down");
                            break;
                        }
                    }

                    _ = sweep_interval.tick() => {
                        if !sweep(&coordinator, &config, &metrics, &mut shutdown_rx).await {
                            tracing::info!("Pre-warm task shutting down");
                            break;
                        }
                    }
                }
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        sweeps = snapshot.sweeps,
        refreshed = snapshot.refreshed,
        already_fresh = snapshot.already_fresh,
        skipped = snapshot.skipped,
        failures = snapshot.failures,
        "Pre-warm task completed"
    );

    metrics
}

/// One pass over the catalog. Returns `false` if shutdown interrupted it.
async fn sweep(
    coordinator: &RefreshCoordinator,
    config: &PrewarmConfig,
    metrics: &PrewarmMetrics,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> bool {
    let descriptors = coordinator.descriptors();

    for (index, descriptor) in descriptors.iter().enumerate() {
        if *shutdown_rx.borrow() {
            return false;
        }

        match coordinator.warm(&descriptor.id).await {
            Ok(outcome) => {
                tracing::debug!(
                    resource = %descriptor.id,
                    outcome = outcome.as_str(),
                    "Pre-warm checked resource"
                );
                let acquired = matches!(
                    outcome,
                    WarmOutcome::Refreshed | WarmOutcome::Failed(_) | WarmOutcome::NotStored(_)
                );
                metrics.record(descriptor.id.as_str(), &outcome);

                // Only pause after work that actually hit the upstream.
                let more = index + 1 < descriptors.len();
                if acquired && more && !config.stagger.is_zero() {
                    tokio::select! {
                        _ = shutdown_rx.changed() => {
                            if *shutdown_rx.borrow() {
                                return false;
                            }
                        }
                        _ = tokio::time::sleep(config.stagger) => {}
                    }
                }
            }
            Err(e) => {
                tracing::error!(resource = %descriptor.id, error = %e, "Pre-warm failed");
                metrics.failures.fetch_add(1, Ordering::Relaxed);
                if let Some(exported) = telemetry::metrics() {
                    exported.record_prewarm(descriptor.id.as_str(), "error");
                }
            }
        }
    }

    metrics.sweeps.fetch_add(1, Ordering::Relaxed);
    let snapshot = metrics.snapshot();
    tracing::info!(
        sweep = snapshot.sweeps,
        refreshed = snapshot.refreshed,
        failures = snapshot.failures,
        "Pre-warm sweep completed"
    );
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use warmcache_core::StalenessPolicy;
    use warmcache_refresh::{RefreshRegistry, ResourceDescriptor};
    use warmcache_storage::CacheStore;
    use warmcache_test_utils::fixtures::{payload, resource_id, seeded_store, t0, entry, DAY_SECS};
    use warmcache_test_utils::{CountingAcquirer, FailingAcquirer, ManualClock};

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_config_defaults() {
        let config = PrewarmConfig::from_lookup(lookup(&[])).expect("config");
        assert!(config.enabled);
        assert_eq!(config.stagger, Duration::from_secs(5));
        assert_eq!(config.interval, Some(Duration::from_secs(900)));
    }

    #[test]
    fn test_config_zero_interval_means_startup_only() {
        let config = PrewarmConfig::from_lookup(lookup(&[
            ("WARMCACHE_PREWARM_INTERVAL_SECS", "0"),
            ("WARMCACHE_PREWARM_ENABLED", "FALSE"),
        ]))
        .expect("config");
        assert_eq!(config.interval, None);
        assert!(!config.enabled);
    }

    #[test]
    fn test_config_rejects_garbage() {
        assert!(PrewarmConfig::from_lookup(lookup(&[("WARMCACHE_PREWARM_STAGGER_SECS", "soon")])).is_err());
    }

    #[tokio::test]
    async fn test_single_sweep_warms_cold_and_stale_only() {
        let clock = ManualClock::shared(t0() + chrono::Duration::days(2));
        // "events" is fresh, "trend" is stale, "cinema" is cold.
        let store = seeded_store(vec![
            entry("events", "E1", t0() + chrono::Duration::days(2) - chrono::Duration::hours(1)),
            entry("trend", "T1", t0()),
        ]);
        let acquirer = CountingAcquirer::returning(payload("NEW")).shared();
        let policy = StalenessPolicy::max_age(Duration::from_secs(DAY_SECS));
        let descriptors = ["events", "trend", "cinema"]
            .into_iter()
            .map(|id| ResourceDescriptor::new(resource_id(id), policy, acquirer.clone()))
            .collect();
        let coordinator = Arc::new(
            RefreshCoordinator::new(store.clone(), RefreshRegistry::shared(), clock, descriptors)
                .expect("coordinator"),
        );

        let (_tx, rx) = watch::channel(false);
        let config = PrewarmConfig {
            enabled: true,
            stagger: Duration::ZERO,
            interval: None,
        };
        let metrics = prewarm_task(coordinator, config, rx).await;

        assert_eq!(
            metrics.snapshot(),
            PrewarmSnapshot {
                sweeps: 1,
                refreshed: 2,
                already_fresh: 1,
                skipped: 0,
                failures: 0,
            }
        );
        assert_eq!(acquirer.calls(), 2);
        assert_eq!(store.get(&resource_id("cinema")).await.expect("warmed").payload, payload("NEW"));
        assert_eq!(store.get(&resource_id("events")).await.expect("kept").payload, payload("E1"));
    }

    #[tokio::test]
    async fn test_failures_are_counted_and_sweep_continues() {
        let clock = ManualClock::shared(t0());
        let policy = StalenessPolicy::max_age(Duration::from_secs(DAY_SECS));
        let failing = Arc::new(FailingAcquirer::new("upstream down"));
        let working = CountingAcquirer::returning(payload("OK")).shared();
        let coordinator = Arc::new(
            RefreshCoordinator::new(
                seeded_store(Vec::new()),
                RefreshRegistry::shared(),
                clock,
                vec![
                    ResourceDescriptor::new(resource_id("flights"), policy, failing.clone()),
                    ResourceDescriptor::new(resource_id("cinema"), policy, working.clone()),
                ],
            )
            .expect("coordinator"),
        );

        let (_tx, rx) = watch::channel(false);
        let config = PrewarmConfig {
            enabled: true,
            stagger: Duration::from_millis(1),
            interval: None,
        };
        let snapshot = prewarm_task(coordinator, config, rx).await.snapshot();

        assert_eq!(snapshot.failures, 1);
        assert_eq!(snapshot.refreshed, 1);
        assert_eq!(failing.calls(), 1);
        assert_eq!(working.calls(), 1);
    }

    #[tokio::test]
    async fn test_disabled_task_does_nothing() {
        let acquirer = CountingAcquirer::returning(payload("X")).shared();
        let coordinator = Arc::new(
            RefreshCoordinator::new(
                seeded_store(Vec::new()),
                RefreshRegistry::shared(),
                ManualClock::shared(t0()),
                vec![ResourceDescriptor::new(
                    resource_id("cinema"),
                    StalenessPolicy::max_age(Duration::from_secs(60)),
                    acquirer.clone(),
                )],
            )
            .expect("coordinator"),
        );
        let (_tx, rx) = watch::channel(false);
        let config = PrewarmConfig {
            enabled: false,
            ..PrewarmConfig::development()
        };
        let snapshot = prewarm_task(coordinator, config, rx).await.snapshot();
        assert_eq!(snapshot.sweeps, 0);
        assert_eq!(acquirer.calls(), 0);
    }

    #[tokio::test]
    async fn test_outcomes_are_exported_to_prometheus() {
        let exported = telemetry::metrics().expect("metrics registered");
        let refreshed = exported
            .prewarm_checks_total
            .with_label_values(&["prewarm-export-cold", "refreshed"]);
        let fresh = exported
            .prewarm_checks_total
            .with_label_values(&["prewarm-export-fresh", "already_fresh"]);
        let (refreshed_before, fresh_before) = (refreshed.get(), fresh.get());

        let clock = ManualClock::shared(t0());
        let policy = StalenessPolicy::max_age(Duration::from_secs(DAY_SECS));
        let acquirer = CountingAcquirer::returning(payload("NEW")).shared();
        let coordinator = Arc::new(
            RefreshCoordinator::new(
                seeded_store(vec![entry("prewarm-export-fresh", "F1", t0())]),
                RefreshRegistry::shared(),
                clock,
                vec![
                    ResourceDescriptor::new(resource_id("prewarm-export-cold"), policy, acquirer.clone()),
                    ResourceDescriptor::new(resource_id("prewarm-export-fresh"), policy, acquirer.clone()),
                ],
            )
            .expect("coordinator"),
        );

        let (_tx, rx) = watch::channel(false);
        let config = PrewarmConfig {
            enabled: true,
            stagger: Duration::ZERO,
            interval: None,
        };
        let snapshot = prewarm_task(coordinator, config, rx).await.snapshot();

        assert_eq!(snapshot.refreshed, 1);
        assert_eq!(snapshot.already_fresh, 1);
        assert_eq!(refreshed.get(), refreshed_before + 1.0);
        assert_eq!(fresh.get(), fresh_before + 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_task_stops_on_shutdown() {
        let acquirer = CountingAcquirer::returning(payload("X")).shared();
        let coordinator = Arc::new(
            RefreshCoordinator::new(
                seeded_store(Vec::new()),
                RefreshRegistry::shared(),
                ManualClock::shared(t0()),
                vec![ResourceDescriptor::new(
                    resource_id("cinema"),
                    StalenessPolicy::max_age(Duration::from_secs(DAY_SECS)),
                    acquirer.clone(),
                )],
            )
            .expect("coordinator"),
        );

        let (tx, rx) = watch::channel(false);
        let config = PrewarmConfig {
            enabled: true,
            stagger: Duration::ZERO,
            interval: Some(Duration::from_secs(60)),
        };
        let handle = tokio::spawn(prewarm_task(coordinator, config, rx));

        // Startup sweep plus two more ticks; the entry stays fresh after the first.
        tokio::time::sleep(Duration::from_secs(150)).await;
        tx.send(true).expect("send shutdown");
        let snapshot = handle.await.expect("task").snapshot();

        assert_eq!(snapshot.sweeps, 3);
        assert_eq!(snapshot.refreshed, 1);
        assert_eq!(snapshot.already_fresh, 2);
        assert_eq!(acquirer.calls(), 1);
    }
}
