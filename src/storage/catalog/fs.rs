use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::error::{RelayError, RelayResult};
use crate::storage::blob::{Blob, FileSource};
use crate::storage::catalog::{BlobPublisher, BlobRetriever};
use crate::storage::fs::write_atomic;
use crate::types::{BlobType, TransitionKey, Version};

const SNAPSHOT_PREFIX: &str = "snapshot-";
const DELTA_PREFIX: &str = "delta-";
const REVERSE_DELTA_PREFIX: &str = "reversedelta-";
const BLOB_SUFFIX: &str = ".blob";

/// Blob catalog backed by one file per blob in a single directory.
///
/// File names carry the transition in hex:
/// `snapshot-<to>.blob`, `delta-<from>-<to>.blob`,
/// `reversedelta-<from>-<to>.blob`.
#[derive(Debug, Clone)]
pub struct FilesystemBlobStore {
    dir: PathBuf,
}

impl FilesystemBlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> RelayResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn blob_path(&self, key: &TransitionKey) -> PathBuf {
        self.dir.join(file_name(key))
    }

    /// Every blob currently in the directory, ordered by transition.
    pub fn list(&self) -> RelayResult<Vec<TransitionKey>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(key) = entry.file_name().to_str().and_then(parse_file_name) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn open_blob(&self, key: TransitionKey) -> RelayResult<Blob> {
        Blob::new(key, Arc::new(FileSource::new(self.blob_path(&key))))
    }

    /// Blob of `blob_type` leaving `from` with the highest target version.
    fn find_transition(&self, blob_type: BlobType, from: Version) -> RelayResult<Option<Blob>> {
        let candidate = self
            .list()?
            .into_iter()
            .filter(|key| key.blob_type == blob_type && key.from == Some(from))
            .max_by_key(|key| key.to);
        candidate.map(|key| self.open_blob(key)).transpose()
    }
}

impl BlobRetriever for FilesystemBlobStore {
    fn retrieve_snapshot_blob(&self, max_version: Version) -> RelayResult<Option<Blob>> {
        let newest = self
            .list()?
            .into_iter()
            .filter(|key| key.blob_type == BlobType::Snapshot && key.to <= max_version)
            .max_by_key(|key| key.to);
        newest.map(|key| self.open_blob(key)).transpose()
    }

    fn retrieve_delta_blob(&self, from: Version) -> RelayResult<Option<Blob>> {
        self.find_transition(BlobType::Delta, from)
    }

    fn retrieve_reverse_delta_blob(&self, from: Version) -> RelayResult<Option<Blob>> {
        self.find_transition(BlobType::ReverseDelta, from)
    }
}

impl BlobPublisher for FilesystemBlobStore {
    fn publish(&self, blob: &Blob) -> RelayResult<()> {
        let key = blob.transition();
        let bytes = blob.read_all().map_err(|err| RelayError::PublishFailed {
            transition: key,
            source: Box::new(err),
        })?;
        let path = self.blob_path(&key);
        write_atomic(&path, &bytes)?;
        debug!(
            transition = %key,
            path = %path.display(),
            bytes = bytes.len(),
            "Blob written"
        );
        Ok(())
    }
}

fn file_name(key: &TransitionKey) -> String {
    match (key.blob_type, key.from) {
        (BlobType::Snapshot, _) | (_, None) => {
            format!("{SNAPSHOT_PREFIX}{:016x}{BLOB_SUFFIX}", key.to.get())
        }
        (BlobType::Delta, Some(from)) => format!(
            "{DELTA_PREFIX}{:016x}-{:016x}{BLOB_SUFFIX}",
            from.get(),
            key.to.get()
        ),
        (BlobType::ReverseDelta, Some(from)) => format!(
            "{REVERSE_DELTA_PREFIX}{:016x}-{:016x}{BLOB_SUFFIX}",
            from.get(),
            key.to.get()
        ),
    }
}

fn parse_file_name(name: &str) -> Option<TransitionKey> {
    let stem = name.strip_suffix(BLOB_SUFFIX)?;
    let key = if let Some(rest) = stem.strip_prefix(SNAPSHOT_PREFIX) {
        TransitionKey::snapshot(parse_hex(rest)?)
    } else if let Some(rest) = stem.strip_prefix(REVERSE_DELTA_PREFIX) {
        let (from, to) = parse_pair(rest)?;
        TransitionKey::reverse_delta(from, to)
    } else if let Some(rest) = stem.strip_prefix(DELTA_PREFIX) {
        let (from, to) = parse_pair(rest)?;
        TransitionKey::delta(from, to)
    } else {
        return None;
    };
    key.check_shape().ok().map(|_| key)
}

fn parse_pair(raw: &str) -> Option<(Version, Version)> {
    let (from, to) = raw.split_once('-')?;
    Some((parse_hex(from)?, parse_hex(to)?))
}

fn parse_hex(raw: &str) -> Option<Version> {
    if raw.len() != 16 {
        return None;
    }
    u64::from_str_radix(raw, 16).ok().map(Version::new)
}
