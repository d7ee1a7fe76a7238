use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Instant;

use parking_lot::{Mutex, MutexGuard, RwLock};
use tracing::{debug, info, warn};

use crate::consumer::config::{ConsumerConfig, FailurePolicy};
use crate::consumer::failed::FailedTransitionTracker;
use crate::consumer::listener::RefreshListener;
use crate::consumer::plan::UpdatePlan;
use crate::consumer::planner::UpdatePlanner;
use crate::error::{RelayError, RelayResult};
use crate::runtime::listeners::notify;
use crate::runtime::metrics::{ConsumerMetrics, MetricsCollector};
use crate::state::transition::apply_blob;
use crate::state::ReadState;
use crate::storage::announcement::AnnouncementWatcher;
use crate::storage::catalog::BlobRetriever;
use crate::types::Version;

/// Keeps an in-memory copy of the dataset and moves it between published
/// versions.
///
/// Refreshes are single-flight: concurrent callers queue behind the one in
/// progress. A refresh started from a listener or subscriber callback of the
/// refresh running on the same thread fails with
/// [`RelayError::ReentrantRefresh`] instead of deadlocking. Readers obtain an immutable [`ReadState`] that stays valid
/// while the consumer moves on.
pub struct Consumer {
    retriever: Arc<dyn BlobRetriever>,
    watcher: Option<Arc<dyn AnnouncementWatcher>>,
    tracker: Arc<FailedTransitionTracker>,
    listeners: RwLock<Vec<Arc<dyn RefreshListener>>>,
    collector: Option<Arc<dyn MetricsCollector<ConsumerMetrics>>>,
    failure_policy: FailurePolicy,
    max_delta_transitions: Option<usize>,
    metrics: ConsumerMetrics,
    refresh_lock: Mutex<()>,
    refresh_owner: Mutex<Option<ThreadId>>,
    current: RwLock<Arc<ReadState>>,
}

impl Consumer {
    pub fn new(config: ConsumerConfig) -> RelayResult<Self> {
        let retriever = config
            .blob_retriever
            .ok_or(RelayError::MissingCollaborator {
                component: "consumer",
                name: "blob retriever",
            })?;

        if config.max_delta_transitions == Some(0) {
            return Err(RelayError::InvalidConfiguration {
                field: "max_delta_transitions",
                reason: "must allow at least one delta transition".to_string(),
            });
        }

        Ok(Self {
            retriever,
            watcher: config.announcement_watcher,
            tracker: config.failed_transitions.unwrap_or_default(),
            listeners: RwLock::new(config.refresh_listeners),
            collector: config.metrics_collector,
            failure_policy: config.failure_policy,
            max_delta_transitions: config.max_delta_transitions,
            metrics: ConsumerMetrics::new(),
            refresh_lock: Mutex::new(()),
            refresh_owner: Mutex::new(None),
            current: RwLock::new(Arc::new(ReadState::empty())),
        })
    }

    /// Refreshes to the latest (or pinned) version.
    pub fn refresh(&self) -> RelayResult<Version> {
        self.refresh_to(Version::LATEST)
    }

    /// Moves the consumer towards `requested` and returns the version reached.
    ///
    /// On a mid-plan failure the consumer stays at the last fully applied
    /// blob and the error carries that version.
    pub fn refresh_to(&self, requested: Version) -> RelayResult<Version> {
        let _flight = self.begin_refresh()?;
        let started = Instant::now();
        let before = self.current_version();
        let listeners = self.listeners.read().clone();

        let target = match self.resolve_target(before, requested) {
            Ok(target) => target,
            Err(err) => return Err(self.fail_refresh(&listeners, before, requested, started, err)),
        };

        if target == before {
            debug!(version = %before, "Consumer already at requested version");
            return Ok(before);
        }

        notify(&listeners, "refresh_started", |l| {
            l.refresh_started(before, target)
        });

        let plan = match self.plan(before, target) {
            Ok(plan) => plan,
            Err(err) => return Err(self.fail_refresh(&listeners, before, requested, started, err)),
        };

        let transition_types = plan.transition_types();
        notify(&listeners, "transitions_planned", |l| {
            l.transitions_planned(before, target, plan.is_snapshot_plan(), &transition_types)
        });
        info!(
            from = %before,
            to = %target,
            transitions = plan.len(),
            snapshot_plan = plan.is_snapshot_plan(),
            "Applying update plan"
        );

        for blob in plan.transitions() {
            let current = self.read_state();
            match apply_blob(&current, blob) {
                Ok(next) => {
                    let next = Arc::new(next);
                    *self.current.write() = Arc::clone(&next);
                    self.metrics.record_transition_applied(blob.blob_type());

                    let transition = blob.transition();
                    debug!(
                        transition = %transition,
                        records = next.len(),
                        "Transition applied"
                    );
                    notify(&listeners, "blob_loaded", |l| l.blob_loaded(&transition));
                    notify(&listeners, "version_changed", |l| l.version_changed(&next));
                }
                Err(err) => {
                    match self.failure_policy {
                        FailurePolicy::BlacklistPlan => self.tracker.mark_all_failed(&plan),
                        FailurePolicy::BlacklistBlob => self.tracker.mark_failed(blob),
                    }
                    let reached = self.current_version();
                    let err = RelayError::TransitionFailed {
                        transition: blob.transition(),
                        reached,
                        source: Box::new(err),
                    };
                    return Err(self.fail_refresh(&listeners, before, requested, started, err));
                }
            }
        }

        let state = self.read_state();
        let after = state.version();
        self.update_blacklist_gauges();
        self.metrics
            .record_refresh_success(after, state.len(), started.elapsed());
        info!(
            from = %before,
            to = %after,
            records = state.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Refresh complete"
        );
        notify(&listeners, "refresh_successful", |l| {
            l.refresh_successful(before, after, requested)
        });
        self.collect_metrics();
        Ok(after)
    }

    /// Version a refresh for `requested` would move to right now.
    pub fn resolve_target(&self, current: Version, requested: Version) -> RelayResult<Version> {
        if let Some(watcher) = &self.watcher {
            if let Some(pinned) = watcher.pinned_version()? {
                if !pinned.is_concrete() {
                    return Err(RelayError::InvalidTarget { target: pinned });
                }
                if pinned != requested && !requested.is_latest() {
                    debug!(pinned = %pinned, requested = %requested, "Pinned version overrides explicit target");
                }
                return Ok(pinned);
            }
        }

        if requested.is_latest() {
            let latest = match &self.watcher {
                Some(watcher) => watcher.latest_version()?,
                None => self.planner().latest_reachable_version(current)?,
            };
            if !latest.is_concrete() {
                return Err(RelayError::NoVersionAvailable);
            }
            return Ok(latest);
        }

        if !requested.is_concrete() {
            return Err(RelayError::InvalidTarget { target: requested });
        }
        Ok(requested)
    }

    /// Refreshes automatically whenever the announcement watcher reports a
    /// new or pinned version.
    pub fn subscribe(self: &Arc<Self>) -> RelayResult<()> {
        let watcher = self
            .watcher
            .as_ref()
            .ok_or(RelayError::MissingCollaborator {
                component: "consumer subscription",
                name: "announcement watcher",
            })?;

        let consumer = Arc::downgrade(self);
        watcher.subscribe(Arc::new(move |announced| {
            let Some(consumer) = consumer.upgrade() else {
                return;
            };
            if let Err(err) = consumer.refresh() {
                warn!(
                    announced = %announced,
                    error = %err,
                    "Announcement-triggered refresh failed"
                );
            }
        }));
        Ok(())
    }

    pub fn current_version(&self) -> Version {
        self.current.read().version()
    }

    /// Immutable view of the current dataset.
    pub fn read_state(&self) -> Arc<ReadState> {
        Arc::clone(&self.current.read())
    }

    pub fn metrics(&self) -> &ConsumerMetrics {
        &self.metrics
    }

    pub fn failed_transitions(&self) -> &Arc<FailedTransitionTracker> {
        &self.tracker
    }

    pub fn add_refresh_listener(&self, listener: Arc<dyn RefreshListener>) {
        self.listeners.write().push(listener);
    }

    pub fn remove_refresh_listener(&self, listener: &Arc<dyn RefreshListener>) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|existing| !Arc::ptr_eq(existing, listener));
        listeners.len() != before
    }

    fn begin_refresh(&self) -> RelayResult<RefreshFlight<'_>> {
        let me = thread::current().id();
        let guard = match self.refresh_lock.try_lock() {
            Some(guard) => guard,
            None => {
                if *self.refresh_owner.lock() == Some(me) {
                    warn!("Refresh re-entered from a refresh callback; rejecting");
                    return Err(RelayError::ReentrantRefresh);
                }
                self.refresh_lock.lock()
            }
        };
        *self.refresh_owner.lock() = Some(me);
        Ok(RefreshFlight {
            owner: &self.refresh_owner,
            _guard: guard,
        })
    }

    fn planner(&self) -> UpdatePlanner<'_> {
        UpdatePlanner::new(self.retriever.as_ref(), &self.tracker)
            .with_max_delta_transitions(self.max_delta_transitions)
    }

    fn plan(&self, current: Version, target: Version) -> RelayResult<UpdatePlan> {
        let plan = self.planner().plan(current, target)?;
        plan.validate_chain(current)
            .map_err(|reason| RelayError::PlanningFailure {
                from: current,
                to: target,
                reason,
            })?;
        Ok(plan)
    }

    fn fail_refresh(
        &self,
        listeners: &[Arc<dyn RefreshListener>],
        before: Version,
        requested: Version,
        started: Instant,
        err: RelayError,
    ) -> RelayError {
        let state = self.read_state();
        let reached = state.version();
        self.update_blacklist_gauges();
        self.metrics
            .record_refresh_failure(reached, state.len(), started.elapsed());
        warn!(
            before = %before,
            reached = %reached,
            requested = %requested,
            error = %err,
            "Refresh failed"
        );
        notify(listeners, "refresh_failed", |l| {
            l.refresh_failed(before, reached, requested, &err)
        });
        self.collect_metrics();
        err
    }

    fn update_blacklist_gauges(&self) {
        self.metrics.update_blacklist(
            self.tracker.count_failed_snapshots(),
            self.tracker.count_failed_deltas(),
        );
    }

    fn collect_metrics(&self) {
        if let Some(collector) = &self.collector {
            collector.collect(&self.metrics);
        }
    }
}

/// Holds the single-flight lock; clears the owner before releasing it.
struct RefreshFlight<'a> {
    owner: &'a Mutex<Option<ThreadId>>,
    _guard: MutexGuard<'a, ()>,
}

impl Drop for RefreshFlight<'_> {
    fn drop(&mut self) {
        *self.owner.lock() = None;
    }
}

impl fmt::Debug for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("current_version", &self.current_version())
            .field("failure_policy", &self.failure_policy)
            .field("blacklisted", &self.tracker.len())
            .finish_non_exhaustive()
    }
}
