use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::{RecordKey, RecordValue, Version};

/// Ordered set of records at one version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    records: BTreeMap<RecordKey, RecordValue>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records<I, K, V>(records: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<RecordKey>,
        V: Into<RecordValue>,
    {
        Self {
            records: records
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.records.get(key).map(Vec::as_slice)
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.records.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> + '_ {
        self.records
            .iter()
            .map(|(key, value)| (key.as_slice(), value.as_slice()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.records.keys().map(Vec::as_slice)
    }

    /// Blake3 digest over the canonical (key-ordered) record sequence,
    /// truncated to 64 bits.
    pub fn checksum(&self) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(self.records.len() as u64).to_le_bytes());
        for (key, value) in &self.records {
            hasher.update(&(key.len() as u64).to_le_bytes());
            hasher.update(key);
            hasher.update(&(value.len() as u64).to_le_bytes());
            hasher.update(value);
        }
        let digest = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest.as_bytes()[..8]);
        u64::from_le_bytes(bytes)
    }

    pub(crate) fn records(&self) -> &BTreeMap<RecordKey, RecordValue> {
        &self.records
    }

    pub(crate) fn records_mut(&mut self) -> &mut BTreeMap<RecordKey, RecordValue> {
        &mut self.records
    }

    pub(crate) fn to_image(&self, version: Version) -> SnapshotImage {
        SnapshotImage {
            version,
            records: self
                .records
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        }
    }

    pub(crate) fn from_image(image: SnapshotImage) -> Self {
        Self {
            records: image.records.into_iter().collect(),
        }
    }
}

/// Serialized form of a full dataset carried by a snapshot blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotImage {
    pub version: Version,
    pub records: Vec<(RecordKey, RecordValue)>,
}

/// Immutable dataset pinned to the version it was materialized at.
///
/// Cloning is cheap; readers holding a `ReadState` keep observing the same
/// records even after the owning consumer moves on.
#[derive(Debug, Clone)]
pub struct ReadState {
    version: Version,
    dataset: Arc<Dataset>,
}

impl ReadState {
    pub fn new(version: Version, dataset: Arc<Dataset>) -> Self {
        Self { version, dataset }
    }

    pub fn empty() -> Self {
        Self::new(Version::NONE, Arc::new(Dataset::new()))
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn dataset(&self) -> &Arc<Dataset> {
        &self.dataset
    }

    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.dataset.get(key)
    }
}
