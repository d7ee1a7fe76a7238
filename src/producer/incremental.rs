//! Producer fed by individual record changes instead of a populate callback.

use std::fmt;

use hashbrown::HashMap;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::RelayResult;
use crate::producer::cycle::Producer;
use crate::types::{RecordKey, RecordValue, Version};

#[derive(Debug, Clone, PartialEq, Eq)]
enum PendingChange {
    Put(RecordValue),
    Remove,
}

/// Buffers puts and removes from any number of threads and publishes them
/// together as one version on [`run_cycle`](Self::run_cycle).
///
/// The last change recorded for a key wins. Changes survive a cycle that
/// fails or is skipped and are retried by the next one; changes recorded
/// while a cycle is running go to the following cycle.
pub struct IncrementalProducer {
    producer: Producer,
    pending: Mutex<HashMap<RecordKey, PendingChange>>,
}

impl IncrementalProducer {
    pub fn new(producer: Producer) -> Self {
        Self {
            producer,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn producer(&self) -> &Producer {
        &self.producer
    }

    pub fn add_or_modify(&self, key: impl Into<RecordKey>, value: impl Into<RecordValue>) {
        self.pending
            .lock()
            .insert(key.into(), PendingChange::Put(value.into()));
    }

    pub fn add_or_modify_all<I, K, V>(&self, records: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<RecordKey>,
        V: Into<RecordValue>,
    {
        let mut pending = self.pending.lock();
        for (key, value) in records {
            pending.insert(key.into(), PendingChange::Put(value.into()));
        }
    }

    pub fn delete(&self, key: impl Into<RecordKey>) {
        self.pending.lock().insert(key.into(), PendingChange::Remove);
    }

    pub fn delete_all<I, K>(&self, keys: I)
    where
        I: IntoIterator<Item = K>,
        K: Into<RecordKey>,
    {
        let mut pending = self.pending.lock();
        for key in keys {
            pending.insert(key.into(), PendingChange::Remove);
        }
    }

    /// Forgets the pending change for `key`, if any.
    pub fn discard(&self, key: &[u8]) -> bool {
        self.pending.lock().remove(key).is_some()
    }

    pub fn clear_changes(&self) {
        self.pending.lock().clear();
    }

    pub fn has_changes(&self) -> bool {
        !self.pending.lock().is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Applies every buffered change on top of the last committed state in
    /// one producer cycle and returns the committed version.
    pub fn run_cycle(&self) -> RelayResult<Version> {
        let batch = std::mem::take(&mut *self.pending.lock());
        debug!(changes = batch.len(), "Flushing incremental changes");

        let mut applied = false;
        let outcome = self.producer.run_cycle(|state| {
            applied = true;
            for (key, change) in &batch {
                match change {
                    PendingChange::Put(value) => {
                        state.put(key.clone(), value.clone());
                    }
                    PendingChange::Remove => {
                        state.remove(key);
                    }
                }
            }
            Ok(())
        });

        // A skipped cycle never runs populate.
        if outcome.is_err() || !applied {
            self.requeue(batch);
        }
        outcome
    }

    fn requeue(&self, batch: HashMap<RecordKey, PendingChange>) {
        let mut pending = self.pending.lock();
        let requeued = batch.len();
        for (key, change) in batch {
            pending.entry(key).or_insert(change);
        }
        warn!(requeued, "Incremental changes were not published; kept for the next cycle");
    }
}

impl fmt::Debug for IncrementalProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncrementalProducer")
            .field("producer", &self.producer)
            .field("pending", &self.pending_len())
            .finish()
    }
}
