//! Producer cycle observers.

use std::time::Duration;

use crate::error::RelayError;
use crate::producer::validation::ValidationStatus;
use crate::state::ReadState;
use crate::types::{TransitionKey, Version};

/// How a cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStatus {
    /// A new version was published (and announced, when an announcer is
    /// configured).
    Succeeded,
    /// The populated state matched the prior one; nothing was published.
    Unchanged,
    /// This producer was not primary.
    Skipped,
    Failed,
}

impl CycleStatus {
    pub fn is_success(self) -> bool {
        matches!(self, CycleStatus::Succeeded | CycleStatus::Unchanged)
    }
}

/// Summary handed to [`ProducerListener::cycle_complete`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub status: CycleStatus,
    /// Version the cycle worked on; `NONE` for skipped cycles.
    pub version: Version,
    /// Last committed version once the cycle ended.
    pub committed: Version,
    pub elapsed: Duration,
    pub error: Option<String>,
}

/// Hooks invoked synchronously by a producer during a cycle.
///
/// Every method defaults to a no-op. A panicking listener is logged and
/// skipped without affecting the cycle.
pub trait ProducerListener: Send + Sync {
    fn cycle_start(&self, _version: Version) {}

    fn cycle_skipped(&self, _committed: Version) {}

    fn populate_complete(&self, _version: Version, _records: usize, _elapsed: Duration) {}

    fn validation_start(&self, _version: Version) {}

    fn validation_complete(&self, _version: Version, _status: &ValidationStatus) {}

    fn blob_published(&self, _transition: &TransitionKey) {}

    fn publish_complete(&self, _version: Version, _elapsed: Duration) {}

    fn announcement_complete(&self, _version: Version, _result: Result<(), &RelayError>) {}

    /// The populated state matched the prior one.
    fn no_delta_available(&self, _version: Version) {}

    /// The new state is committed; `state` is what a restore would produce.
    fn new_state_committed(&self, _state: &ReadState) {}

    fn cycle_complete(&self, _report: &CycleReport) {}
}
