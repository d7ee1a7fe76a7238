use std::fmt;
use std::sync::Arc;

use crate::consumer::failed::FailedTransitionTracker;
use crate::consumer::listener::RefreshListener;
use crate::runtime::metrics::{ConsumerMetrics, MetricsCollector};
use crate::storage::announcement::AnnouncementWatcher;
use crate::storage::catalog::BlobRetriever;

/// What to blacklist when a blob fails to apply mid-plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Every transition of the attempted plan, including those applied
    /// before the failing one.
    #[default]
    BlacklistPlan,
    /// Only the blob whose application failed.
    BlacklistBlob,
}

/// Configuration for a [`Consumer`](crate::consumer::Consumer).
#[derive(Clone, Default)]
pub struct ConsumerConfig {
    /// Where blobs are read from (required)
    pub blob_retriever: Option<Arc<dyn BlobRetriever>>,
    /// Source of the latest/pinned version; without one, LATEST is
    /// discovered by walking the catalog
    pub announcement_watcher: Option<Arc<dyn AnnouncementWatcher>>,
    /// Blacklist shared with the planner; a fresh tracker when absent
    pub failed_transitions: Option<Arc<FailedTransitionTracker>>,
    pub refresh_listeners: Vec<Arc<dyn RefreshListener>>,
    pub metrics_collector: Option<Arc<dyn MetricsCollector<ConsumerMetrics>>>,
    pub failure_policy: FailurePolicy,
    /// Longest delta chain followed from the current version before a
    /// snapshot-anchored plan is used instead
    pub max_delta_transitions: Option<usize>,
}

impl ConsumerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blob_retriever(mut self, retriever: Arc<dyn BlobRetriever>) -> Self {
        self.blob_retriever = Some(retriever);
        self
    }

    pub fn with_announcement_watcher(mut self, watcher: Arc<dyn AnnouncementWatcher>) -> Self {
        self.announcement_watcher = Some(watcher);
        self
    }

    pub fn with_failed_transitions(mut self, tracker: Arc<FailedTransitionTracker>) -> Self {
        self.failed_transitions = Some(tracker);
        self
    }

    pub fn with_refresh_listener(mut self, listener: Arc<dyn RefreshListener>) -> Self {
        self.refresh_listeners.push(listener);
        self
    }

    pub fn with_metrics_collector(
        mut self,
        collector: Arc<dyn MetricsCollector<ConsumerMetrics>>,
    ) -> Self {
        self.metrics_collector = Some(collector);
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_max_delta_transitions(mut self, limit: usize) -> Self {
        self.max_delta_transitions = Some(limit);
        self
    }
}

impl fmt::Debug for ConsumerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerConfig")
            .field("blob_retriever", &self.blob_retriever.is_some())
            .field("announcement_watcher", &self.announcement_watcher.is_some())
            .field("refresh_listeners", &self.refresh_listeners.len())
            .field("metrics_collector", &self.metrics_collector.is_some())
            .field("failure_policy", &self.failure_policy)
            .field("max_delta_transitions", &self.max_delta_transitions)
            .finish_non_exhaustive()
    }
}
