use crate::storage::blob::Blob;
use crate::types::{BlobType, Version};

/// Ordered blobs leading from one version to another.
///
/// A plan holds at most one snapshot, always first, followed by a chain of
/// deltas (or reverse deltas) whose origins match the previous target.
#[derive(Debug, Clone, Default)]
pub struct UpdatePlan {
    transitions: Vec<Blob>,
}

impl UpdatePlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, blob: Blob) {
        self.transitions.push(blob);
    }

    pub fn append(&mut self, other: UpdatePlan) {
        self.transitions.extend(other.transitions);
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn transitions(&self) -> &[Blob] {
        &self.transitions
    }

    pub fn iter(&self) -> impl Iterator<Item = &Blob> + '_ {
        self.transitions.iter()
    }

    pub fn is_snapshot_plan(&self) -> bool {
        self.transitions
            .first()
            .map(Blob::is_snapshot)
            .unwrap_or(false)
    }

    pub fn snapshot_transition(&self) -> Option<&Blob> {
        self.transitions.first().filter(|blob| blob.is_snapshot())
    }

    /// Everything after the leading snapshot, if any.
    pub fn delta_transitions(&self) -> &[Blob] {
        if self.is_snapshot_plan() {
            &self.transitions[1..]
        } else {
            &self.transitions
        }
    }

    pub fn transition_types(&self) -> Vec<BlobType> {
        self.transitions.iter().map(Blob::blob_type).collect()
    }

    /// Version reached once every blob is applied, or `current` for an
    /// empty plan.
    pub fn destination_version(&self, current: Version) -> Version {
        self.transitions
            .last()
            .map(Blob::to_version)
            .unwrap_or(current)
    }

    /// Checks the chaining rules starting from `start`. Every blob after the
    /// snapshot must move in the same direction.
    pub fn validate_chain(&self, start: Version) -> Result<(), String> {
        let mut at = start;
        let mut direction = None;
        for (index, blob) in self.transitions.iter().enumerate() {
            match blob.blob_type() {
                BlobType::Snapshot if index != 0 => {
                    return Err(format!("snapshot at position {index} is not first"));
                }
                BlobType::Snapshot => {}
                kind @ (BlobType::Delta | BlobType::ReverseDelta) => {
                    if *direction.get_or_insert(kind) != kind {
                        return Err(format!(
                            "{} mixes directions within one plan",
                            blob.transition()
                        ));
                    }
                    if blob.from_version() != Some(at) {
                        return Err(format!(
                            "{} does not continue from version {at}",
                            blob.transition()
                        ));
                    }
                }
            }
            at = blob.to_version();
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a UpdatePlan {
    type Item = &'a Blob;
    type IntoIter = std::slice::Iter<'a, Blob>;

    fn into_iter(self) -> Self::IntoIter {
        self.transitions.iter()
    }
}
