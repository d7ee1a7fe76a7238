//! Metrics and observability for producers and consumers.
//!
//! Counters are lock-free atomics shared behind an `Arc`; the last 100
//! cycle/refresh durations are kept for percentile reporting.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::types::{BlobType, Version};

pub mod health;
pub mod snapshot;

pub use health::{HealthState, HealthStatus};
pub use snapshot::{ConsumerMetricsSnapshot, ProducerMetricsSnapshot};

use snapshot::{average, DurationWindow};

/// Pluggable sink handed the metrics after every producer cycle or consumer
/// refresh.
pub trait MetricsCollector<M>: Send + Sync {
    fn collect(&self, metrics: &M);
}

#[derive(Debug, Default)]
struct Recent {
    durations: DurationWindow,
    last_success: Option<Instant>,
}

impl Recent {
    fn last_success_secs(&self) -> Option<u64> {
        self.last_success.map(|t| t.elapsed().as_secs())
    }
}

/// Producer-side metrics.
#[derive(Debug, Clone, Default)]
pub struct ProducerMetrics {
    inner: Arc<ProducerMetricsInner>,
}

#[derive(Debug, Default)]
struct ProducerMetricsInner {
    cycles_completed: AtomicU64,
    cycles_succeeded: AtomicU64,
    cycles_failed: AtomicU64,
    cycles_skipped: AtomicU64,
    cycles_without_changes: AtomicU64,
    consecutive_failures: AtomicU64,
    snapshots_published: AtomicU64,
    snapshots_failed: AtomicU64,
    deltas_published: AtomicU64,
    reverse_deltas_published: AtomicU64,
    last_published_version: AtomicU64,
    total_records: AtomicUsize,
    total_cycle_time_us: AtomicU64,
    recent: RwLock<Recent>,
}

impl ProducerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_cycle_success(&self, version: Version, records: usize, duration: Duration) {
        self.complete_cycle(duration, true);
        self.inner
            .last_published_version
            .store(version.get(), Ordering::Relaxed);
        self.inner.total_records.store(records, Ordering::Relaxed);
    }

    /// A cycle whose populated state matched the prior one.
    pub fn record_cycle_without_changes(&self, duration: Duration) {
        self.inner
            .cycles_without_changes
            .fetch_add(1, Ordering::Relaxed);
        self.complete_cycle(duration, true);
    }

    pub fn record_cycle_failure(&self, duration: Duration) {
        self.complete_cycle(duration, false);
    }

    pub fn record_cycle_skipped(&self) {
        self.inner.cycles_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_blob_published(&self, blob_type: BlobType) {
        let counter = match blob_type {
            BlobType::Snapshot => &self.inner.snapshots_published,
            BlobType::Delta => &self.inner.deltas_published,
            BlobType::ReverseDelta => &self.inner.reverse_deltas_published,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_snapshot_failed(&self) {
        self.inner.snapshots_failed.fetch_add(1, Ordering::Relaxed);
    }

    fn complete_cycle(&self, duration: Duration, success: bool) {
        self.inner.cycles_completed.fetch_add(1, Ordering::Relaxed);
        if success {
            self.inner.cycles_succeeded.fetch_add(1, Ordering::Relaxed);
            self.inner.consecutive_failures.store(0, Ordering::Relaxed);
        } else {
            self.inner.cycles_failed.fetch_add(1, Ordering::Relaxed);
            self.inner
                .consecutive_failures
                .fetch_add(1, Ordering::Relaxed);
        }
        self.inner
            .total_cycle_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);

        let mut recent = self.inner.recent.write();
        recent.durations.record(duration);
        if success {
            recent.last_success = Some(Instant::now());
        }
    }

    pub fn snapshot(&self) -> ProducerMetricsSnapshot {
        let inner = &self.inner;
        let cycles_completed = inner.cycles_completed.load(Ordering::Relaxed);
        let recent = inner.recent.read();

        ProducerMetricsSnapshot {
            cycles_completed,
            cycles_succeeded: inner.cycles_succeeded.load(Ordering::Relaxed),
            cycles_failed: inner.cycles_failed.load(Ordering::Relaxed),
            cycles_skipped: inner.cycles_skipped.load(Ordering::Relaxed),
            cycles_without_changes: inner.cycles_without_changes.load(Ordering::Relaxed),
            consecutive_failures: inner.consecutive_failures.load(Ordering::Relaxed),
            snapshots_published: inner.snapshots_published.load(Ordering::Relaxed),
            snapshots_failed: inner.snapshots_failed.load(Ordering::Relaxed),
            deltas_published: inner.deltas_published.load(Ordering::Relaxed),
            reverse_deltas_published: inner.reverse_deltas_published.load(Ordering::Relaxed),
            last_published_version: Version::new(
                inner.last_published_version.load(Ordering::Relaxed),
            ),
            total_records: inner.total_records.load(Ordering::Relaxed),
            avg_cycle_time_us: average(
                inner.total_cycle_time_us.load(Ordering::Relaxed),
                cycles_completed,
            ),
            cycle_p50_us: recent.durations.percentile(50),
            cycle_p95_us: recent.durations.percentile(95),
            cycle_p99_us: recent.durations.percentile(99),
            last_success_secs: recent.last_success_secs(),
        }
    }

    pub fn health(&self) -> HealthStatus {
        health::derive_producer_health(&self.snapshot())
    }
}

/// Consumer-side metrics.
#[derive(Debug, Clone, Default)]
pub struct ConsumerMetrics {
    inner: Arc<ConsumerMetricsInner>,
}

#[derive(Debug, Default)]
struct ConsumerMetricsInner {
    refreshes_succeeded: AtomicU64,
    refreshes_failed: AtomicU64,
    consecutive_failures: AtomicU64,
    current_version: AtomicU64,
    total_records: AtomicUsize,
    snapshots_applied: AtomicU64,
    deltas_applied: AtomicU64,
    reverse_deltas_applied: AtomicU64,
    blacklisted_snapshots: AtomicUsize,
    blacklisted_deltas: AtomicUsize,
    total_refresh_time_us: AtomicU64,
    recent: RwLock<Recent>,
}

impl ConsumerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_refresh_success(&self, version: Version, records: usize, duration: Duration) {
        self.inner
            .refreshes_succeeded
            .fetch_add(1, Ordering::Relaxed);
        self.inner.consecutive_failures.store(0, Ordering::Relaxed);
        self.update_state(version, records);
        self.record_duration(duration, true);
    }

    /// `version` is whatever the consumer reached before the failure.
    pub fn record_refresh_failure(&self, version: Version, records: usize, duration: Duration) {
        self.inner.refreshes_failed.fetch_add(1, Ordering::Relaxed);
        self.inner
            .consecutive_failures
            .fetch_add(1, Ordering::Relaxed);
        self.update_state(version, records);
        self.record_duration(duration, false);
    }

    pub fn record_transition_applied(&self, blob_type: BlobType) {
        let counter = match blob_type {
            BlobType::Snapshot => &self.inner.snapshots_applied,
            BlobType::Delta => &self.inner.deltas_applied,
            BlobType::ReverseDelta => &self.inner.reverse_deltas_applied,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn update_blacklist(&self, snapshots: usize, deltas: usize) {
        self.inner
            .blacklisted_snapshots
            .store(snapshots, Ordering::Relaxed);
        self.inner
            .blacklisted_deltas
            .store(deltas, Ordering::Relaxed);
    }

    fn update_state(&self, version: Version, records: usize) {
        self.inner
            .current_version
            .store(version.get(), Ordering::Relaxed);
        self.inner.total_records.store(records, Ordering::Relaxed);
    }

    fn record_duration(&self, duration: Duration, success: bool) {
        self.inner
            .total_refresh_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        let mut recent = self.inner.recent.write();
        recent.durations.record(duration);
        if success {
            recent.last_success = Some(Instant::now());
        }
    }

    pub fn snapshot(&self) -> ConsumerMetricsSnapshot {
        let inner = &self.inner;
        let refreshes_succeeded = inner.refreshes_succeeded.load(Ordering::Relaxed);
        let refreshes_failed = inner.refreshes_failed.load(Ordering::Relaxed);
        let snapshots_applied = inner.snapshots_applied.load(Ordering::Relaxed);
        let deltas_applied = inner.deltas_applied.load(Ordering::Relaxed);
        let reverse_deltas_applied = inner.reverse_deltas_applied.load(Ordering::Relaxed);
        let recent = inner.recent.read();

        ConsumerMetricsSnapshot {
            refreshes_succeeded,
            refreshes_failed,
            consecutive_failures: inner.consecutive_failures.load(Ordering::Relaxed),
            current_version: Version::new(inner.current_version.load(Ordering::Relaxed)),
            total_records: inner.total_records.load(Ordering::Relaxed),
            transitions_applied: snapshots_applied + deltas_applied + reverse_deltas_applied,
            snapshots_applied,
            deltas_applied,
            reverse_deltas_applied,
            blacklisted_snapshots: inner.blacklisted_snapshots.load(Ordering::Relaxed),
            blacklisted_deltas: inner.blacklisted_deltas.load(Ordering::Relaxed),
            avg_refresh_time_us: average(
                inner.total_refresh_time_us.load(Ordering::Relaxed),
                refreshes_succeeded + refreshes_failed,
            ),
            refresh_p50_us: recent.durations.percentile(50),
            refresh_p95_us: recent.durations.percentile(95),
            refresh_p99_us: recent.durations.percentile(99),
            last_success_secs: recent.last_success_secs(),
        }
    }

    pub fn health(&self) -> HealthStatus {
        health::derive_consumer_health(&self.snapshot())
    }
}
