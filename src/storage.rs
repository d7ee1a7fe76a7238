//! Blob transport: the blob codec, blob catalogs, announcement channels and
//! filesystem helpers.

pub mod announcement;
pub mod blob;
pub mod catalog;
pub mod fs;

pub mod prelude {
    pub use super::announcement::{
        AnnouncementWatcher, Announcer, FilesystemAnnouncement, InMemoryAnnouncement,
    };
    pub use super::blob::{Blob, BlobSource, BytesSource, CodecOptions, FileSource};
    pub use super::catalog::{BlobPublisher, BlobRetriever, FilesystemBlobStore, InMemoryBlobStore};
}
