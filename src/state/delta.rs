use serde::{Deserialize, Serialize};

use crate::state::dataset::Dataset;
use crate::types::{RecordOp, UndoEntry, UndoOp, Version};

/// Record mutations moving a dataset from `from` to `to`.
///
/// Forward and reverse deltas share this shape; only the direction of the
/// versions differs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetDelta {
    pub from: Version,
    pub to: Version,
    pub ops: Vec<RecordOp>,
}

impl DatasetDelta {
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Applies the operations to a copy of `base`.
    ///
    /// Removing an absent key is a no-op. Callers are responsible for checking
    /// that `base` is the state at `self.from`.
    pub fn apply_to(&self, base: &Dataset) -> Dataset {
        let mut next = base.clone();
        let records = next.records_mut();
        for op in &self.ops {
            match op {
                RecordOp::Put { key, value } => {
                    records.insert(key.clone(), value.clone());
                }
                RecordOp::Remove { key } => {
                    records.remove(key);
                }
            }
        }
        next
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeltaStats {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl DeltaStats {
    pub fn total(&self) -> usize {
        self.inserted + self.updated + self.deleted
    }
}

/// Forward delta, its inverse, and what changed.
#[derive(Debug, Clone)]
pub struct StagedTransition {
    pub forward: DatasetDelta,
    pub reverse: DatasetDelta,
    pub stats: DeltaStats,
}

/// Computes the operations taking `prior` (at `from`) to `next` (at `to`),
/// together with the undo entries that revert them.
pub(crate) fn plan_transition(
    prior: &Dataset,
    from: Version,
    next: &Dataset,
    to: Version,
) -> StagedTransition {
    let mut ops = Vec::new();
    let mut undo_entries = Vec::new();
    let mut stats = DeltaStats::default();

    for (key, value) in next.records() {
        match prior.records().get(key) {
            Some(previous) if previous == value => {}
            Some(previous) => {
                ops.push(RecordOp::Put {
                    key: key.clone(),
                    value: value.clone(),
                });
                undo_entries.push(UndoEntry {
                    key: key.clone(),
                    previous: Some(previous.clone()),
                    op: UndoOp::Updated,
                });
                stats.updated += 1;
            }
            None => {
                ops.push(RecordOp::Put {
                    key: key.clone(),
                    value: value.clone(),
                });
                undo_entries.push(UndoEntry {
                    key: key.clone(),
                    previous: None,
                    op: UndoOp::Inserted,
                });
                stats.inserted += 1;
            }
        }
    }

    for (key, previous) in prior.records() {
        if !next.contains_key(key) {
            ops.push(RecordOp::Remove { key: key.clone() });
            undo_entries.push(UndoEntry {
                key: key.clone(),
                previous: Some(previous.clone()),
                op: UndoOp::Deleted,
            });
            stats.deleted += 1;
        }
    }

    StagedTransition {
        forward: DatasetDelta { from, to, ops },
        reverse: DatasetDelta {
            from: to,
            to: from,
            ops: invert(undo_entries),
        },
        stats,
    }
}

fn invert(undo_entries: Vec<UndoEntry>) -> Vec<RecordOp> {
    undo_entries
        .into_iter()
        .rev()
        .map(|entry| match (entry.op, entry.previous) {
            (UndoOp::Inserted, _) | (_, None) => RecordOp::Remove { key: entry.key },
            (UndoOp::Updated | UndoOp::Deleted, Some(previous)) => RecordOp::Put {
                key: entry.key,
                value: previous,
            },
        })
        .collect()
}
