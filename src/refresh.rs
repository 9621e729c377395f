#![cfg(feature = "web")]
//! The refresh driver: reloads the source on a timer or on demand and
//! publishes complete snapshots.
//!
//! At most one cycle runs at a time. A cycle's result becomes visible only
//! through a single pointer swap once load and aggregation have both
//! finished, so readers see either the previous snapshot or the new one.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;

use crate::cache::SnapshotCache;
use crate::error::{DashboardError, Result};
use crate::metrics::{KpiDeltas, KpiSummary};
use crate::model::Dataset;
use crate::source::SourceDescriptor;

/// One published, immutable result of a refresh cycle.
#[derive(Debug)]
pub struct Snapshot {
    pub generation: u64,
    pub loaded_at: DateTime<Utc>,
    pub dataset: Arc<Dataset>,
    pub summary: KpiSummary,
    pub deltas: Option<KpiDeltas>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshState {
    Idle,
    Refreshing,
}

/// When the driver reloads on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    /// Timer period; `None` reloads only on explicit triggers.
    pub interval: Option<Duration>,
    /// Upper bound for the backoff delay after repeated failures.
    pub max_backoff: Duration,
}

impl RefreshPolicy {
    pub fn manual() -> Self {
        RefreshPolicy {
            interval: None,
            max_backoff: Duration::from_secs(300),
        }
    }

    pub fn every(interval: Duration) -> Self {
        RefreshPolicy {
            interval: Some(interval),
            ..Self::manual()
        }
    }

    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    /// Delay before the next timed attempt after `failures` consecutive
    /// `SourceUnavailable` errors: `min(interval * 2^failures, max_backoff)`.
    pub fn delay_after(&self, failures: u32) -> Option<Duration> {
        let base = self.interval?;
        if failures == 0 {
            return Some(base);
        }
        let factor = 2u32.saturating_pow(failures.min(20));
        Some(base.saturating_mul(factor).min(self.max_backoff.max(base)))
    }
}

/// What a refresh attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A new snapshot with this generation was published.
    Published(u64),
    /// The source was unchanged; the current generation stays.
    Unchanged(u64),
    /// Another cycle was already in flight.
    Skipped,
}

/// Result of an external trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOutcome {
    /// A cycle will start shortly.
    Queued,
    /// A cycle is in flight; one more will follow it.
    Coalesced,
}

#[derive(Debug, Clone, Serialize)]
pub struct DriverStatus {
    pub state: RefreshState,
    pub source: String,
    pub generation: u64,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_error_kind: Option<&'static str>,
    pub consecutive_failures: u32,
    pub next_delay_secs: Option<u64>,
}

#[derive(Default)]
struct Health {
    last_success: Option<DateTime<Utc>>,
    last_error: Option<(String, &'static str)>,
    consecutive_failures: u32,
}

struct Inner {
    source: SourceDescriptor,
    policy: RefreshPolicy,
    track_deltas: bool,
    cache: Mutex<SnapshotCache>,
    refreshing: AtomicBool,
    force_pending: AtomicBool,
    trigger: Notify,
    current: RwLock<Option<Arc<Snapshot>>>,
    baseline: Mutex<Option<KpiSummary>>,
    health: Mutex<Health>,
    generation: AtomicU64,
}

/// Marks a cycle as in flight; dropping it returns the driver to `Idle`.
pub struct CycleGuard {
    inner: Arc<Inner>,
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        self.inner.refreshing.store(false, Ordering::Release);
    }
}

#[derive(Clone)]
pub struct RefreshDriver {
    inner: Arc<Inner>,
}

impl RefreshDriver {
    pub fn new(source: SourceDescriptor, policy: RefreshPolicy) -> Self {
        Self::build(source, policy, false)
    }

    /// A driver that reports visit and revenue deltas against the first
    /// snapshot it publishes.
    pub fn tracking_deltas(source: SourceDescriptor, policy: RefreshPolicy) -> Self {
        Self::build(source, policy, true)
    }

    fn build(source: SourceDescriptor, policy: RefreshPolicy, track_deltas: bool) -> Self {
        RefreshDriver {
            inner: Arc::new(Inner {
                source,
                policy,
                track_deltas,
                cache: Mutex::new(SnapshotCache::new()),
                refreshing: AtomicBool::new(false),
                force_pending: AtomicBool::new(false),
                trigger: Notify::new(),
                current: RwLock::new(None),
                baseline: Mutex::new(None),
                health: Mutex::new(Health::default()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn source(&self) -> &SourceDescriptor {
        &self.inner.source
    }

    /// The latest complete snapshot, if any cycle has succeeded.
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.inner
            .current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn state(&self) -> RefreshState {
        if self.inner.refreshing.load(Ordering::Acquire) {
            RefreshState::Refreshing
        } else {
            RefreshState::Idle
        }
    }

    /// Move from `Idle` to `Refreshing`, or `None` if a cycle is in flight.
    pub fn begin_cycle(&self) -> Option<CycleGuard> {
        self.inner
            .refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CycleGuard {
                inner: Arc::clone(&self.inner),
            })
    }

    pub fn status(&self) -> DriverStatus {
        let health = self.inner.health.lock().unwrap_or_else(|e| e.into_inner());
        DriverStatus {
            state: self.state(),
            source: self.inner.source.to_string(),
            generation: self.inner.generation.load(Ordering::Acquire),
            last_success: health.last_success,
            last_error: health.last_error.as_ref().map(|(m, _)| m.clone()),
            last_error_kind: health.last_error.as_ref().map(|(_, k)| *k),
            consecutive_failures: health.consecutive_failures,
            next_delay_secs: self
                .inner
                .policy
                .delay_after(health.consecutive_failures)
                .map(|d| d.as_secs()),
        }
    }

    /// Delay before the next timed cycle, honouring backoff.
    pub fn next_delay(&self) -> Option<Duration> {
        let failures = self
            .inner
            .health
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .consecutive_failures;
        self.inner.policy.delay_after(failures)
    }

    /// Ask the background loop for a forced reload.
    pub fn trigger(&self) -> TriggerOutcome {
        self.inner.force_pending.store(true, Ordering::Release);
        self.inner.trigger.notify_one();
        match self.state() {
            RefreshState::Refreshing => TriggerOutcome::Coalesced,
            RefreshState::Idle => TriggerOutcome::Queued,
        }
    }

    /// Run one cycle now unless one is already in flight.
    ///
    /// With `force` the cache entry is invalidated first, so the source is
    /// reread even if its freshness stamp is unchanged.
    pub async fn refresh_once(&self, force: bool) -> Result<RefreshOutcome> {
        let Some(_guard) = self.begin_cycle() else {
            debug!("refresh of {} skipped: cycle already in flight", self.inner.source);
            return Ok(RefreshOutcome::Skipped);
        };

        let started = Instant::now();
        let inner = Arc::clone(&self.inner);
        let loaded = tokio::task::spawn_blocking(move || {
            let mut cache = inner.cache.lock().unwrap_or_else(|e| e.into_inner());
            if force {
                cache.invalidate(&inner.source);
            }
            cache.load(&inner.source)
        })
        .await
        .unwrap_or_else(|e| {
            Err(DashboardError::unavailable(
                self.inner.source.to_string(),
                format!("load task failed: {}", e),
            ))
        });

        let lookup = match loaded {
            Ok(lookup) => lookup,
            Err(e) => {
                self.record_failure(&e);
                return Err(e);
            }
        };

        if lookup.is_hit() {
            if let Some(current) = self.snapshot() {
                if Arc::ptr_eq(&current.dataset, lookup.dataset()) {
                    self.record_success();
                    debug!("{} unchanged at generation {}", self.inner.source, current.generation);
                    return Ok(RefreshOutcome::Unchanged(current.generation));
                }
            }
        }

        let dataset = Arc::clone(lookup.dataset());
        let summary = KpiSummary::of(&dataset);
        let deltas = if self.inner.track_deltas {
            let mut baseline = self.inner.baseline.lock().unwrap_or_else(|e| e.into_inner());
            Some(summary.deltas_since(baseline.get_or_insert_with(|| summary.clone())))
        } else {
            None
        };

        let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let snapshot = Arc::new(Snapshot {
            generation,
            loaded_at: Utc::now(),
            dataset,
            summary,
            deltas,
        });
        *self.inner.current.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&snapshot));
        self.record_success();

        info!(
            "published generation {} from {}: {} stores, {} customers, {} visits in {:?}",
            generation,
            self.inner.source,
            snapshot.dataset.stores.len(),
            snapshot.dataset.customers.len(),
            snapshot.dataset.visits.len(),
            started.elapsed()
        );
        Ok(RefreshOutcome::Published(generation))
    }

    fn record_success(&self) {
        let mut health = self.inner.health.lock().unwrap_or_else(|e| e.into_inner());
        health.last_success = Some(Utc::now());
        health.last_error = None;
        health.consecutive_failures = 0;
    }

    fn record_failure(&self, e: &DashboardError) {
        let mut health = self.inner.health.lock().unwrap_or_else(|e| e.into_inner());
        if e.is_source_unavailable() {
            health.consecutive_failures = health.consecutive_failures.saturating_add(1);
        } else {
            health.consecutive_failures = 0;
        }
        health.last_error = Some((e.to_string(), e.kind()));
        let retry = self.inner.policy.delay_after(health.consecutive_failures);
        warn!(
            "refresh of {} failed ({}); next timed attempt in {:?}",
            self.inner.source, e, retry
        );
    }

    /// Run the refresh loop until `shutdown` changes or its sender is dropped.
    ///
    /// The first cycle starts immediately. A cycle still in flight at
    /// shutdown is abandoned and never published.
    pub fn spawn(&self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let driver = self.clone();
        tokio::spawn(async move {
            let mut first = true;
            loop {
                if *shutdown.borrow() {
                    break;
                }
                if !first {
                    let delay = driver.next_delay();
                    let wait = async move {
                        match delay {
                            Some(d) => tokio::time::sleep(d).await,
                            None => std::future::pending::<()>().await,
                        }
                    };
                    tokio::select! {
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                break;
                            }
                            continue;
                        }
                        _ = driver.inner.trigger.notified() => {}
                        _ = wait => {}
                    }
                }
                first = false;

                let force = driver.inner.force_pending.swap(false, Ordering::AcqRel);
                tokio::select! {
                    _ = shutdown.changed() => {
                        info!("shutdown requested; abandoning in-flight refresh");
                        break;
                    }
                    // Errors are recorded and logged by refresh_once
                    _ = driver.refresh_once(force) => {}
                }
            }
            debug!("refresh loop for {} stopped", driver.inner.source);
        })
    }
}
