//! Published blobs and the sources their bytes are read from.

pub mod format;

use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{RelayError, RelayResult};
use crate::types::{BlobType, TransitionKey, Version};

pub use format::{BlobPayload, CodecOptions};

/// Where a blob's bytes live. Opened lazily, once per application attempt.
pub trait BlobSource: Send + Sync {
    fn open(&self) -> io::Result<Box<dyn Read + Send>>;
}

/// In-memory blob bytes.
#[derive(Debug, Clone)]
pub struct BytesSource {
    bytes: Arc<[u8]>,
}

impl BytesSource {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl BlobSource for BytesSource {
    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(Cursor::new(Arc::clone(&self.bytes))))
    }
}

/// Blob bytes stored in a file, opened on demand.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BlobSource for FileSource {
    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(io::BufReader::new(File::open(&self.path)?)))
    }
}

/// Immutable published artifact: a snapshot or a directed delta.
#[derive(Clone)]
pub struct Blob {
    key: TransitionKey,
    source: Arc<dyn BlobSource>,
}

impl Blob {
    /// Builds a blob after checking its versions agree with its type.
    pub fn new(key: TransitionKey, source: Arc<dyn BlobSource>) -> RelayResult<Self> {
        key.check_shape()
            .map_err(|reason| RelayError::InvalidTransition {
                transition: key,
                reason,
            })?;
        Ok(Self { key, source })
    }

    pub fn snapshot(to: Version, source: Arc<dyn BlobSource>) -> RelayResult<Self> {
        Self::new(TransitionKey::snapshot(to), source)
    }

    pub fn delta(from: Version, to: Version, source: Arc<dyn BlobSource>) -> RelayResult<Self> {
        Self::new(TransitionKey::delta(from, to), source)
    }

    pub fn reverse_delta(
        from: Version,
        to: Version,
        source: Arc<dyn BlobSource>,
    ) -> RelayResult<Self> {
        Self::new(TransitionKey::reverse_delta(from, to), source)
    }

    pub fn from_version(&self) -> Option<Version> {
        self.key.from
    }

    pub fn to_version(&self) -> Version {
        self.key.to
    }

    pub fn blob_type(&self) -> BlobType {
        self.key.blob_type
    }

    pub fn is_snapshot(&self) -> bool {
        self.key.blob_type == BlobType::Snapshot
    }

    pub fn is_delta(&self) -> bool {
        self.key.blob_type == BlobType::Delta
    }

    pub fn is_reverse_delta(&self) -> bool {
        self.key.blob_type == BlobType::ReverseDelta
    }

    pub fn transition(&self) -> TransitionKey {
        self.key
    }

    pub fn source(&self) -> &Arc<dyn BlobSource> {
        &self.source
    }

    pub fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        self.source.open()
    }

    /// Reads the whole blob into memory.
    pub fn read_all(&self) -> io::Result<Vec<u8>> {
        let mut reader = self.open()?;
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    /// Same identity, different bytes.
    pub fn with_source(&self, source: Arc<dyn BlobSource>) -> Self {
        Self {
            key: self.key,
            source,
        }
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blob")
            .field("from", &self.key.from)
            .field("to", &self.key.to)
            .field("type", &self.key.blob_type)
            .finish_non_exhaustive()
    }
}
