use hashbrown::HashSet;
use parking_lot::RwLock;
use tracing::warn;

use crate::consumer::plan::UpdatePlan;
use crate::storage::blob::Blob;
use crate::types::{BlobType, TransitionKey};

/// Blacklist of transitions known not to apply cleanly.
///
/// Entries live until [`clear`](Self::clear) is called; nothing is persisted.
#[derive(Debug, Default)]
pub struct FailedTransitionTracker {
    failed: RwLock<HashSet<TransitionKey>>,
}

impl FailedTransitionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_failed(&self, blob: &Blob) {
        self.mark_transition_failed(blob.transition());
    }

    pub fn mark_transition_failed(&self, key: TransitionKey) {
        if self.failed.write().insert(key) {
            warn!(transition = %key, "Transition blacklisted");
        }
    }

    pub fn mark_all_failed(&self, plan: &UpdatePlan) {
        let mut failed = self.failed.write();
        for blob in plan {
            let key = blob.transition();
            if failed.insert(key) {
                warn!(transition = %key, "Transition blacklisted");
            }
        }
    }

    pub fn is_failed(&self, blob: &Blob) -> bool {
        self.failed.read().contains(&blob.transition())
    }

    pub fn any_failed(&self, plan: &UpdatePlan) -> bool {
        let failed = self.failed.read();
        plan.iter().any(|blob| failed.contains(&blob.transition()))
    }

    pub fn count_failed_snapshots(&self) -> usize {
        self.failed
            .read()
            .iter()
            .filter(|key| key.blob_type == BlobType::Snapshot)
            .count()
    }

    /// Deltas and reverse deltas together.
    pub fn count_failed_deltas(&self) -> usize {
        self.failed
            .read()
            .iter()
            .filter(|key| key.blob_type.is_delta_like())
            .count()
    }

    pub fn len(&self) -> usize {
        self.failed.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.failed.read().is_empty()
    }

    /// Blacklisted transitions in a stable order.
    pub fn failed_transitions(&self) -> Vec<TransitionKey> {
        let mut keys: Vec<_> = self.failed.read().iter().copied().collect();
        keys.sort();
        keys
    }

    pub fn clear(&self) {
        self.failed.write().clear();
    }
}
