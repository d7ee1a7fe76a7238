use crate::state::dataset::{Dataset, ReadState};
use crate::types::{RecordKey, RecordValue, Version};

/// Mutable dataset handed to the populate callback of a producer cycle.
///
/// It starts as a copy of the prior committed state, so a callback only has
/// to express what changed. The handle borrows the prior state and cannot
/// outlive the populate stage.
#[derive(Debug)]
pub struct WriteState<'a> {
    version: Version,
    prior: Option<&'a ReadState>,
    dataset: Dataset,
}

impl<'a> WriteState<'a> {
    pub(crate) fn new(version: Version, prior: Option<&'a ReadState>) -> Self {
        let dataset = prior
            .map(|state| state.dataset().as_ref().clone())
            .unwrap_or_default();
        Self {
            version,
            prior,
            dataset,
        }
    }

    /// Version being populated.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Last committed state, if any.
    pub fn prior(&self) -> Option<&'a ReadState> {
        self.prior
    }

    /// Inserts or replaces a record, returning the previous value.
    pub fn put(
        &mut self,
        key: impl Into<RecordKey>,
        value: impl Into<RecordValue>,
    ) -> Option<RecordValue> {
        self.dataset
            .records_mut()
            .insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<RecordValue> {
        self.dataset.records_mut().remove(key)
    }

    /// Drops every record; useful for callbacks that rebuild from scratch.
    pub fn clear(&mut self) {
        self.dataset.records_mut().clear();
    }

    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.dataset.get(key)
    }

    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    pub(crate) fn into_dataset(self) -> Dataset {
        self.dataset
    }
}
