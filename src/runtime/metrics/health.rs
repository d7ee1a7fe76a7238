use serde::{Deserialize, Serialize};

use crate::types::Version;

use super::{ConsumerMetricsSnapshot, ProducerMetricsSnapshot};

/// Consecutive failures after which a component is reported unhealthy.
pub const UNHEALTHY_FAILURE_STREAK: u64 = 3;

/// Health status of a producer or consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub state: HealthState,
    pub current_version: Version,
    pub total_failures: u64,
    pub consecutive_failures: u64,
    pub blacklisted_transitions: usize,
    pub last_success_secs: Option<u64>,
}

/// Health state enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthState {
    Healthy,
    Idle,
    Degraded,
    Unhealthy,
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthState::Healthy => write!(f, "HEALTHY"),
            HealthState::Idle => write!(f, "IDLE"),
            HealthState::Degraded => write!(f, "DEGRADED"),
            HealthState::Unhealthy => write!(f, "UNHEALTHY"),
        }
    }
}

fn classify(consecutive_failures: u64, degraded: bool, has_activity: bool) -> HealthState {
    if consecutive_failures >= UNHEALTHY_FAILURE_STREAK {
        HealthState::Unhealthy
    } else if consecutive_failures > 0 || degraded {
        HealthState::Degraded
    } else if !has_activity {
        HealthState::Idle
    } else {
        HealthState::Healthy
    }
}

pub(crate) fn derive_producer_health(snapshot: &ProducerMetricsSnapshot) -> HealthStatus {
    let state = classify(
        snapshot.consecutive_failures,
        snapshot.snapshots_failed > 0,
        snapshot.cycles_succeeded > 0,
    );

    HealthStatus {
        state,
        current_version: snapshot.last_published_version,
        total_failures: snapshot.cycles_failed,
        consecutive_failures: snapshot.consecutive_failures,
        blacklisted_transitions: 0,
        last_success_secs: snapshot.last_success_secs,
    }
}

pub(crate) fn derive_consumer_health(snapshot: &ConsumerMetricsSnapshot) -> HealthStatus {
    let state = classify(
        snapshot.consecutive_failures,
        snapshot.blacklisted_transitions() > 0,
        snapshot.refreshes_succeeded > 0,
    );

    HealthStatus {
        state,
        current_version: snapshot.current_version,
        total_failures: snapshot.refreshes_failed,
        consecutive_failures: snapshot.consecutive_failures,
        blacklisted_transitions: snapshot.blacklisted_transitions(),
        last_success_secs: snapshot.last_success_secs,
    }
}
