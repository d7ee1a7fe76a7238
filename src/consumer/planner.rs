//! Update planning: choosing the blobs that move a consumer between versions.
//!
//! Forward moves prefer continuing the delta chain from the current version
//! and fall back to the newest usable snapshot at or below the target plus
//! the deltas after it. Rollbacks prefer a snapshot-anchored path and fall
//! back to reverse deltas. Blacklisted transitions are never planned, and a
//! plan always lands exactly on the requested version.

use tracing::debug;

use crate::consumer::failed::FailedTransitionTracker;
use crate::consumer::plan::UpdatePlan;
use crate::error::{RelayError, RelayResult};
use crate::storage::blob::Blob;
use crate::storage::catalog::BlobRetriever;
use crate::types::{BlobType, Version};

/// Computes the plan from `current` to `desired` against `retriever`,
/// avoiding everything `tracker` has blacklisted.
pub fn plan_update(
    current: Version,
    desired: Version,
    retriever: &dyn BlobRetriever,
    tracker: &FailedTransitionTracker,
) -> RelayResult<UpdatePlan> {
    UpdatePlanner::new(retriever, tracker).plan(current, desired)
}

pub struct UpdatePlanner<'a> {
    retriever: &'a dyn BlobRetriever,
    tracker: &'a FailedTransitionTracker,
    max_delta_transitions: Option<usize>,
}

impl<'a> UpdatePlanner<'a> {
    pub fn new(retriever: &'a dyn BlobRetriever, tracker: &'a FailedTransitionTracker) -> Self {
        Self {
            retriever,
            tracker,
            max_delta_transitions: None,
        }
    }

    /// Bounds the delta chain followed from the current version before a
    /// snapshot-anchored plan is considered instead. When no snapshot path
    /// exists the full delta chain is still used.
    pub fn with_max_delta_transitions(mut self, limit: Option<usize>) -> Self {
        self.max_delta_transitions = limit;
        self
    }

    pub fn plan(&self, current: Version, desired: Version) -> RelayResult<UpdatePlan> {
        if desired.is_latest() || (desired.is_none() && !current.is_none()) {
            return Err(RelayError::InvalidTarget { target: desired });
        }
        if desired == current {
            return Ok(UpdatePlan::new());
        }

        let plan = if desired > current {
            match self.delta_plan(current, desired, BlobType::Delta, self.max_delta_transitions)? {
                Some(plan) => Some(plan),
                None => match self.snapshot_plan(desired)? {
                    Some(plan) => Some(plan),
                    None if self.max_delta_transitions.is_some() => {
                        self.delta_plan(current, desired, BlobType::Delta, None)?
                    }
                    None => None,
                },
            }
        } else {
            match self.snapshot_plan(desired)? {
                Some(plan) => Some(plan),
                None => self.delta_plan(current, desired, BlobType::ReverseDelta, None)?,
            }
        };

        match plan {
            Some(plan) => {
                debug_assert!(!self.tracker.any_failed(&plan));
                debug!(
                    from = %current,
                    to = %desired,
                    transitions = plan.len(),
                    snapshot_plan = plan.is_snapshot_plan(),
                    "Update plan computed"
                );
                Ok(plan)
            }
            None => Err(RelayError::PlanningFailure {
                from: current,
                to: desired,
                reason: self.failure_reason(desired > current),
            }),
        }
    }

    /// Newest version reachable from `current` or from the newest snapshot by
    /// following forward deltas, used when no announcement is available.
    pub fn latest_reachable_version(&self, current: Version) -> RelayResult<Version> {
        let from_current = if current.is_concrete() {
            self.follow_deltas(current)?
        } else {
            Version::NONE
        };

        let from_snapshot = match self.retriever.retrieve_snapshot_blob(Version::LATEST)? {
            Some(snapshot) if snapshot.is_snapshot() && !self.tracker.is_failed(&snapshot) => {
                self.follow_deltas(snapshot.to_version())?
            }
            _ => Version::NONE,
        };

        let latest = from_current.max(from_snapshot);
        if latest.is_none() {
            return Err(RelayError::NoVersionAvailable);
        }
        Ok(latest)
    }

    /// Chain of `kind` blobs walking from `start` to exactly `desired`.
    fn delta_plan(
        &self,
        start: Version,
        desired: Version,
        kind: BlobType,
        limit: Option<usize>,
    ) -> RelayResult<Option<UpdatePlan>> {
        if !start.is_concrete() {
            return Ok(None);
        }

        let forward = kind == BlobType::Delta;
        let mut plan = UpdatePlan::new();
        let mut at = start;
        while at != desired {
            if limit.is_some_and(|limit| plan.len() >= limit) {
                debug!(from = %start, to = %desired, "Delta chain exceeds configured bound");
                return Ok(None);
            }

            let Some(blob) = self.next_link(at, kind)? else {
                debug!(at = %at, kind = %kind, "Missing link in delta chain");
                return Ok(None);
            };

            let overshoots = if forward {
                blob.to_version() > desired
            } else {
                blob.to_version() < desired
            };
            if overshoots {
                return Ok(None);
            }
            if self.tracker.is_failed(&blob) {
                debug!(transition = %blob.transition(), "Skipping blacklisted transition");
                return Ok(None);
            }

            at = blob.to_version();
            plan.add(blob);
        }
        Ok(Some(plan))
    }

    /// Newest non-blacklisted snapshot at or below `desired` from which a
    /// delta chain reaches `desired`; older snapshots are tried in turn.
    fn snapshot_plan(&self, desired: Version) -> RelayResult<Option<UpdatePlan>> {
        let mut ceiling = desired;
        loop {
            let Some(snapshot) = self.retriever.retrieve_snapshot_blob(ceiling)? else {
                return Ok(None);
            };
            let version = snapshot.to_version();
            if !snapshot.is_snapshot() || version > ceiling {
                debug!(transition = %snapshot.transition(), ceiling = %ceiling, "Catalog returned an unusable snapshot");
                return Ok(None);
            }

            if self.tracker.is_failed(&snapshot) {
                debug!(version = %version, "Skipping blacklisted snapshot");
            } else if let Some(deltas) = self.delta_plan(version, desired, BlobType::Delta, None)? {
                let mut plan = UpdatePlan::new();
                plan.add(snapshot);
                plan.append(deltas);
                return Ok(Some(plan));
            }

            match version.get().checked_sub(1).map(Version::new) {
                Some(next) if next.is_concrete() => ceiling = next,
                _ => return Ok(None),
            }
        }
    }

    fn next_link(&self, at: Version, kind: BlobType) -> RelayResult<Option<Blob>> {
        let blob = match kind {
            BlobType::Delta => self.retriever.retrieve_delta_blob(at)?,
            BlobType::ReverseDelta => self.retriever.retrieve_reverse_delta_blob(at)?,
            BlobType::Snapshot => None,
        };
        Ok(blob.filter(|blob| {
            let chains = blob.blob_type() == kind && blob.from_version() == Some(at);
            if !chains {
                debug!(at = %at, transition = %blob.transition(), "Catalog returned a blob that does not chain");
            }
            chains
        }))
    }

    fn follow_deltas(&self, start: Version) -> RelayResult<Version> {
        let mut at = start;
        while let Some(blob) = self.next_link(at, BlobType::Delta)? {
            if self.tracker.is_failed(&blob) || blob.to_version() <= at {
                break;
            }
            at = blob.to_version();
        }
        Ok(at)
    }

    fn failure_reason(&self, forward: bool) -> String {
        let blacklisted = self.tracker.len();
        let base = if forward {
            "no delta chain or snapshot-anchored chain reaches the target"
        } else {
            "no snapshot-anchored chain or reverse delta chain reaches the target"
        };
        if blacklisted > 0 {
            format!("{base} ({blacklisted} transitions blacklisted)")
        } else {
            base.to_string()
        }
    }
}
