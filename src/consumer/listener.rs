//! Refresh observers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::RelayError;
use crate::state::ReadState;
use crate::types::{BlobType, TransitionKey, Version};

/// Hooks invoked synchronously by a consumer during a refresh.
///
/// Every method defaults to a no-op. A panicking listener is logged and
/// skipped without affecting the refresh. Calling `refresh` on the same
/// consumer from inside a hook returns [`RelayError::ReentrantRefresh`].
pub trait RefreshListener: Send + Sync {
    fn refresh_started(&self, _current: Version, _requested: Version) {}

    fn transitions_planned(
        &self,
        _current: Version,
        _desired: Version,
        _is_snapshot_plan: bool,
        _transitions: &[BlobType],
    ) {
    }

    fn blob_loaded(&self, _transition: &TransitionKey) {}

    /// The visible state changed; called once per applied blob.
    fn version_changed(&self, _state: &ReadState) {}

    fn refresh_successful(&self, _before: Version, _after: Version, _requested: Version) {}

    fn refresh_failed(
        &self,
        _before: Version,
        _reached: Version,
        _requested: Version,
        _error: &RelayError,
    ) {
    }
}

/// What one refresh did, as observed by [`RefreshMetricsListener`].
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumerRefreshMetrics {
    pub duration: Duration,
    pub is_refresh_success: bool,
    /// The refresh started with no state loaded.
    pub is_initial_load: bool,
    /// `Snapshot` for snapshot plans, otherwise the type of the first delta.
    pub overall_refresh_type: Option<BlobType>,
    pub plan: UpdatePlanDetails,
    pub consecutive_failures: u64,
    /// Time since the last successful refresh; zero on success, `None` if
    /// nothing has succeeded yet.
    pub refresh_success_age: Option<Duration>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdatePlanDetails {
    pub before_version: Version,
    pub desired_version: Version,
    pub transition_sequence: Vec<BlobType>,
    pub num_successful_transitions: usize,
}

#[derive(Debug, Default)]
struct RefreshTracking {
    started: Option<Instant>,
    plan: UpdatePlanDetails,
    is_initial_load: bool,
    overall_refresh_type: Option<BlobType>,
    consecutive_failures: u64,
    last_success: Option<Instant>,
}

type Reporter = Arc<dyn Fn(&ConsumerRefreshMetrics) + Send + Sync>;

/// Builds a [`ConsumerRefreshMetrics`] record per refresh and hands it to a
/// reporter callback.
pub struct RefreshMetricsListener {
    tracking: Mutex<RefreshTracking>,
    reporter: Reporter,
}

impl RefreshMetricsListener {
    pub fn new(reporter: impl Fn(&ConsumerRefreshMetrics) + Send + Sync + 'static) -> Self {
        Self {
            tracking: Mutex::new(RefreshTracking::default()),
            reporter: Arc::new(reporter),
        }
    }

    fn finish(&self, success: bool) {
        let metrics = {
            let mut tracking = self.tracking.lock();
            let now = Instant::now();
            let refresh_success_age = if success {
                tracking.consecutive_failures = 0;
                tracking.last_success = Some(now);
                Some(Duration::ZERO)
            } else {
                tracking.consecutive_failures += 1;
                tracking.last_success.map(|at| now.duration_since(at))
            };
            ConsumerRefreshMetrics {
                duration: tracking
                    .started
                    .take()
                    .map(|at| now.duration_since(at))
                    .unwrap_or_default(),
                is_refresh_success: success,
                is_initial_load: tracking.is_initial_load,
                overall_refresh_type: tracking.overall_refresh_type,
                plan: std::mem::take(&mut tracking.plan),
                consecutive_failures: tracking.consecutive_failures,
                refresh_success_age,
            }
        };
        (self.reporter)(&metrics);
    }
}

impl RefreshListener for RefreshMetricsListener {
    fn refresh_started(&self, current: Version, requested: Version) {
        let mut tracking = self.tracking.lock();
        tracking.started = Some(Instant::now());
        tracking.is_initial_load = current.is_none();
        tracking.overall_refresh_type = None;
        tracking.plan = UpdatePlanDetails {
            before_version: current,
            desired_version: requested,
            ..UpdatePlanDetails::default()
        };
    }

    fn transitions_planned(
        &self,
        _current: Version,
        desired: Version,
        is_snapshot_plan: bool,
        transitions: &[BlobType],
    ) {
        let mut tracking = self.tracking.lock();
        tracking.plan.desired_version = desired;
        tracking.plan.transition_sequence = transitions.to_vec();
        tracking.overall_refresh_type = if is_snapshot_plan {
            Some(BlobType::Snapshot)
        } else {
            transitions.first().copied()
        };
    }

    fn blob_loaded(&self, _transition: &TransitionKey) {
        self.tracking.lock().plan.num_successful_transitions += 1;
    }

    fn refresh_successful(&self, _before: Version, _after: Version, _requested: Version) {
        self.finish(true);
    }

    fn refresh_failed(
        &self,
        _before: Version,
        _reached: Version,
        _requested: Version,
        _error: &RelayError,
    ) {
        self.finish(false);
    }
}

impl std::fmt::Debug for RefreshMetricsListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshMetricsListener")
            .field("tracking", &*self.tracking.lock())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collecting() -> (RefreshMetricsListener, Arc<Mutex<Vec<ConsumerRefreshMetrics>>>) {
        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reports);
        let listener = RefreshMetricsListener::new(move |m| sink.lock().push(m.clone()));
        (listener, reports)
    }

    #[test]
    fn successful_snapshot_refresh() {
        let (listener, reports) = collecting();
        listener.refresh_started(Version::NONE, Version::LATEST);
        listener.transitions_planned(
            Version::NONE,
            Version::new(3),
            true,
            &[BlobType::Snapshot, BlobType::Delta],
        );
        listener.blob_loaded(&TransitionKey::snapshot(Version::new(2)));
        listener.blob_loaded(&TransitionKey::delta(Version::new(2), Version::new(3)));
        listener.refresh_successful(Version::NONE, Version::new(3), Version::LATEST);

        let reports = reports.lock();
        let report = &reports[0];
        assert!(report.is_refresh_success);
        assert!(report.is_initial_load);
        assert_eq!(report.overall_refresh_type, Some(BlobType::Snapshot));
        assert_eq!(report.plan.desired_version, Version::new(3));
        assert_eq!(report.plan.num_successful_transitions, 2);
        assert_eq!(report.consecutive_failures, 0);
        assert_eq!(report.refresh_success_age, Some(Duration::ZERO));
    }

    #[test]
    fn failures_accumulate_until_success() {
        let (listener, reports) = collecting();
        let err = RelayError::NoVersionAvailable;
        for _ in 0..2 {
            listener.refresh_started(Version::new(1), Version::new(2));
            listener.refresh_failed(Version::new(1), Version::new(1), Version::new(2), &err);
        }
        {
            let reports = reports.lock();
            assert_eq!(reports[1].consecutive_failures, 2);
            assert!(!reports[1].is_refresh_success);
            assert!(!reports[1].is_initial_load);
            assert_eq!(reports[1].refresh_success_age, None);
            assert_eq!(reports[1].overall_refresh_type, None);
        }

        listener.refresh_started(Version::new(1), Version::new(2));
        listener.transitions_planned(Version::new(1), Version::new(2), false, &[BlobType::Delta]);
        listener.refresh_successful(Version::new(1), Version::new(2), Version::new(2));
        listener.refresh_started(Version::new(2), Version::new(1));
        listener.refresh_failed(Version::new(2), Version::new(2), Version::new(1), &err);

        let reports = reports.lock();
        assert_eq!(reports[2].overall_refresh_type, Some(BlobType::Delta));
        assert_eq!(reports[2].consecutive_failures, 0);
        assert_eq!(reports[3].consecutive_failures, 1);
        assert!(reports[3].refresh_success_age.is_some());
    }
}
