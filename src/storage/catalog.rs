//! Blob catalogs: where published blobs are stored and looked up.

pub mod fs;
pub mod memory;

pub use fs::FilesystemBlobStore;
pub use memory::InMemoryBlobStore;

use crate::error::RelayResult;
use crate::storage::blob::Blob;
use crate::types::Version;

/// Read side of a blob catalog.
///
/// `Ok(None)` means the link is missing; `Err` means the catalog itself could
/// not be queried.
pub trait BlobRetriever: Send + Sync {
    /// Newest snapshot whose version is at or below `max_version`.
    fn retrieve_snapshot_blob(&self, max_version: Version) -> RelayResult<Option<Blob>>;

    /// Forward delta starting at `from`.
    fn retrieve_delta_blob(&self, from: Version) -> RelayResult<Option<Blob>>;

    /// Reverse delta starting at `from`.
    fn retrieve_reverse_delta_blob(&self, from: Version) -> RelayResult<Option<Blob>>;
}

/// Write side of a blob catalog.
pub trait BlobPublisher: Send + Sync {
    fn publish(&self, blob: &Blob) -> RelayResult<()>;
}
