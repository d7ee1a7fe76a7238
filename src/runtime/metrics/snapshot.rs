use std::collections::VecDeque;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::Version;

const RECENT_WINDOW: usize = 100;

/// Producer metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducerMetricsSnapshot {
    pub cycles_completed: u64,
    pub cycles_succeeded: u64,
    pub cycles_failed: u64,
    pub cycles_skipped: u64,
    pub cycles_without_changes: u64,
    pub consecutive_failures: u64,
    pub snapshots_published: u64,
    pub snapshots_failed: u64,
    pub deltas_published: u64,
    pub reverse_deltas_published: u64,
    pub last_published_version: Version,
    pub total_records: usize,
    pub avg_cycle_time_us: u64,
    pub cycle_p50_us: u64,
    pub cycle_p95_us: u64,
    pub cycle_p99_us: u64,
    pub last_success_secs: Option<u64>,
}

/// Consumer metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerMetricsSnapshot {
    pub refreshes_succeeded: u64,
    pub refreshes_failed: u64,
    pub consecutive_failures: u64,
    pub current_version: Version,
    pub total_records: usize,
    pub transitions_applied: u64,
    pub snapshots_applied: u64,
    pub deltas_applied: u64,
    pub reverse_deltas_applied: u64,
    pub blacklisted_snapshots: usize,
    pub blacklisted_deltas: usize,
    pub avg_refresh_time_us: u64,
    pub refresh_p50_us: u64,
    pub refresh_p95_us: u64,
    pub refresh_p99_us: u64,
    pub last_success_secs: Option<u64>,
}

impl ConsumerMetricsSnapshot {
    pub fn blacklisted_transitions(&self) -> usize {
        self.blacklisted_snapshots + self.blacklisted_deltas
    }
}

/// Most recent durations, in microseconds.
#[derive(Debug, Default)]
pub(crate) struct DurationWindow {
    samples_us: VecDeque<u64>,
}

impl DurationWindow {
    pub(crate) fn record(&mut self, duration: Duration) {
        if self.samples_us.len() >= RECENT_WINDOW {
            self.samples_us.pop_front();
        }
        self.samples_us.push_back(duration.as_micros() as u64);
    }

    pub(crate) fn percentile(&self, percentile: u8) -> u64 {
        calculate_percentile(&self.samples_us, percentile)
    }

    #[cfg(test)]
    pub(crate) fn samples(&self) -> &VecDeque<u64> {
        &self.samples_us
    }
}

pub(crate) fn calculate_percentile(values: &VecDeque<u64>, percentile: u8) -> u64 {
    if values.is_empty() {
        return 0;
    }

    let mut sorted: Vec<_> = values.iter().copied().collect();
    sorted.sort_unstable();

    let index = ((percentile as f64 / 100.0) * (sorted.len() as f64 - 1.0)).round() as usize;
    sorted[index.min(sorted.len() - 1)]
}

pub(crate) fn average(total: u64, count: u64) -> u64 {
    if count > 0 {
        total / count
    } else {
        0
    }
}
