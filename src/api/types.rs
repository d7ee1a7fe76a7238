use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of one published state of the dataset.
///
/// Versions are totally ordered. [`Version::NONE`] sorts before every minted
/// version and [`Version::LATEST`] after every minted version, so neither
/// sentinel can ever be minted. The default is [`Version::NONE`].
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Version(u64);

impl Version {
    /// No version has been loaded yet.
    pub const NONE: Version = Version(u64::MIN);
    /// Whatever version is newest at resolution time.
    pub const LATEST: Version = Version(u64::MAX);

    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn is_none(self) -> bool {
        self == Self::NONE
    }

    #[inline]
    pub fn is_latest(self) -> bool {
        self == Self::LATEST
    }

    /// True for every version that can identify a published state.
    #[inline]
    pub fn is_concrete(self) -> bool {
        !self.is_none() && !self.is_latest()
    }
}

impl From<u64> for Version {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "none")
        } else if self.is_latest() {
            write!(f, "latest")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Kind of published blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BlobType {
    /// Full state at `to_version`; has no origin version.
    Snapshot,
    /// Forward transition, `from < to`.
    Delta,
    /// Backward transition, `from > to`.
    ReverseDelta,
}

impl BlobType {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            BlobType::Snapshot => 1,
            BlobType::Delta => 2,
            BlobType::ReverseDelta => 3,
        }
    }

    pub(crate) fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(BlobType::Snapshot),
            2 => Some(BlobType::Delta),
            3 => Some(BlobType::ReverseDelta),
            _ => None,
        }
    }

    /// Deltas and reverse deltas both mutate an existing state.
    pub fn is_delta_like(self) -> bool {
        !matches!(self, BlobType::Snapshot)
    }
}

impl fmt::Display for BlobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlobType::Snapshot => write!(f, "SNAPSHOT"),
            BlobType::Delta => write!(f, "DELTA"),
            BlobType::ReverseDelta => write!(f, "REVERSE_DELTA"),
        }
    }
}

/// Identity of a blob: `(from, to, type)`.
///
/// Two blobs with the same key are interchangeable, which is what the
/// failed-transition blacklist relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransitionKey {
    pub from: Option<Version>,
    pub to: Version,
    pub blob_type: BlobType,
}

impl TransitionKey {
    pub fn snapshot(to: Version) -> Self {
        Self {
            from: None,
            to,
            blob_type: BlobType::Snapshot,
        }
    }

    pub fn delta(from: Version, to: Version) -> Self {
        Self {
            from: Some(from),
            to,
            blob_type: BlobType::Delta,
        }
    }

    pub fn reverse_delta(from: Version, to: Version) -> Self {
        Self {
            from: Some(from),
            to,
            blob_type: BlobType::ReverseDelta,
        }
    }

    /// Checks the direction constraints of the blob type.
    pub(crate) fn check_shape(&self) -> Result<(), &'static str> {
        if !self.to.is_concrete() {
            return Err("target version must be concrete");
        }
        match (self.blob_type, self.from) {
            (BlobType::Snapshot, None) => Ok(()),
            (BlobType::Snapshot, Some(_)) => Err("snapshot blobs have no origin version"),
            (_, None) => Err("delta blobs require an origin version"),
            (_, Some(from)) if !from.is_concrete() => Err("origin version must be concrete"),
            (BlobType::Delta, Some(from)) if from >= self.to => {
                Err("delta must move to a newer version")
            }
            (BlobType::ReverseDelta, Some(from)) if from <= self.to => {
                Err("reverse delta must move to an older version")
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for TransitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.from {
            Some(from) => write!(f, "{}({} -> {})", self.blob_type, from, self.to),
            None => write!(f, "{}(-> {})", self.blob_type, self.to),
        }
    }
}

/// Opaque record key. Records are ordered by key bytes.
pub type RecordKey = Vec<u8>;

/// Opaque record payload.
pub type RecordValue = Vec<u8>;

/// One mutation carried by a delta blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordOp {
    Put { key: RecordKey, value: RecordValue },
    Remove { key: RecordKey },
}

impl RecordOp {
    pub fn key(&self) -> &[u8] {
        match self {
            RecordOp::Put { key, .. } | RecordOp::Remove { key } => key,
        }
    }

    #[inline]
    pub fn is_remove(&self) -> bool {
        matches!(self, RecordOp::Remove { .. })
    }
}

/// How a forward operation changed a record, kept so it can be undone.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum UndoOp {
    Inserted,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UndoEntry {
    pub key: RecordKey,
    pub previous: Option<RecordValue>,
    pub op: UndoOp,
}
