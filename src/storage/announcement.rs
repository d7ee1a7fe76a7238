//! Announcement channels: how producers advertise the newest version and how
//! consumers learn about it.

pub mod fs;
pub mod memory;

pub use fs::FilesystemAnnouncement;
pub use memory::InMemoryAnnouncement;

use std::sync::Arc;

use crate::error::RelayResult;
use crate::types::Version;

/// Invoked with the version a watcher now resolves to.
pub type AnnouncementCallback = Arc<dyn Fn(Version) + Send + Sync>;

/// Producer side of an announcement channel.
pub trait Announcer: Send + Sync {
    fn announce(&self, version: Version) -> RelayResult<()>;
}

/// Consumer side of an announcement channel.
pub trait AnnouncementWatcher: Send + Sync {
    /// Latest announced version, [`Version::NONE`] when nothing was announced.
    fn latest_version(&self) -> RelayResult<Version>;

    /// Version operators pinned consumers to, if any.
    fn pinned_version(&self) -> RelayResult<Option<Version>> {
        Ok(None)
    }

    /// Registers a callback fired after every announcement or pin change.
    ///
    /// Watchers that can only be polled ignore subscriptions.
    fn subscribe(&self, _callback: AnnouncementCallback) {}
}
