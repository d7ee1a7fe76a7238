use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::error::RelayResult;
use crate::storage::blob::Blob;
use crate::storage::catalog::{BlobPublisher, BlobRetriever};
use crate::types::{BlobType, Version};

/// Process-local blob catalog.
///
/// Deltas are indexed by their origin version; publishing a second delta from
/// the same origin replaces the first.
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    inner: RwLock<Catalog>,
}

#[derive(Debug, Default)]
struct Catalog {
    snapshots: BTreeMap<Version, Blob>,
    deltas: BTreeMap<Version, Blob>,
    reverse_deltas: BTreeMap<Version, Blob>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remove_snapshot(&self, version: Version) -> bool {
        self.inner.write().snapshots.remove(&version).is_some()
    }

    pub fn remove_delta(&self, from: Version) -> bool {
        self.inner.write().deltas.remove(&from).is_some()
    }

    pub fn remove_reverse_delta(&self, from: Version) -> bool {
        self.inner.write().reverse_deltas.remove(&from).is_some()
    }

    pub fn snapshot_versions(&self) -> Vec<Version> {
        self.inner.read().snapshots.keys().copied().collect()
    }

    pub fn blob_count(&self) -> usize {
        let inner = self.inner.read();
        inner.snapshots.len() + inner.deltas.len() + inner.reverse_deltas.len()
    }
}

impl BlobRetriever for InMemoryBlobStore {
    fn retrieve_snapshot_blob(&self, max_version: Version) -> RelayResult<Option<Blob>> {
        Ok(self
            .inner
            .read()
            .snapshots
            .range(..=max_version)
            .next_back()
            .map(|(_, blob)| blob.clone()))
    }

    fn retrieve_delta_blob(&self, from: Version) -> RelayResult<Option<Blob>> {
        Ok(self.inner.read().deltas.get(&from).cloned())
    }

    fn retrieve_reverse_delta_blob(&self, from: Version) -> RelayResult<Option<Blob>> {
        Ok(self.inner.read().reverse_deltas.get(&from).cloned())
    }
}

impl BlobPublisher for InMemoryBlobStore {
    fn publish(&self, blob: &Blob) -> RelayResult<()> {
        let mut inner = self.inner.write();
        match blob.blob_type() {
            BlobType::Snapshot => {
                inner.snapshots.insert(blob.to_version(), blob.clone());
            }
            BlobType::Delta => {
                if let Some(from) = blob.from_version() {
                    inner.deltas.insert(from, blob.clone());
                }
            }
            BlobType::ReverseDelta => {
                if let Some(from) = blob.from_version() {
                    inner.reverse_deltas.insert(from, blob.clone());
                }
            }
        }
        Ok(())
    }
}
