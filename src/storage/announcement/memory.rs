use std::panic::{self, AssertUnwindSafe};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::error::RelayResult;
use crate::runtime::listeners::panic_message;
use crate::storage::announcement::{AnnouncementCallback, AnnouncementWatcher, Announcer};
use crate::types::Version;

/// Process-local announcement channel with pinning and push notification.
#[derive(Default)]
pub struct InMemoryAnnouncement {
    state: RwLock<AnnouncementState>,
    subscribers: Mutex<Vec<AnnouncementCallback>>,
}

#[derive(Debug, Default, Clone, Copy)]
struct AnnouncementState {
    latest: Version,
    pinned: Option<Version>,
}

impl AnnouncementState {
    fn effective(&self) -> Version {
        self.pinned.unwrap_or(self.latest)
    }
}

impl InMemoryAnnouncement {
    pub fn new() -> Self {
        Self::default()
    }

    /// Freezes every watcher on `version` until [`unpin`](Self::unpin).
    pub fn pin(&self, version: Version) {
        let effective = {
            let mut state = self.state.write();
            state.pinned = Some(version);
            state.effective()
        };
        debug!(version = %version, "Announcement pinned");
        self.notify(effective);
    }

    pub fn unpin(&self) {
        let effective = {
            let mut state = self.state.write();
            state.pinned = None;
            state.effective()
        };
        debug!(latest = %effective, "Announcement unpinned");
        self.notify(effective);
    }

    pub fn is_pinned(&self) -> bool {
        self.state.read().pinned.is_some()
    }

    /// Last announced version, ignoring any pin.
    pub fn announced_version(&self) -> Version {
        self.state.read().latest
    }

    fn notify(&self, version: Version) {
        let subscribers: Vec<AnnouncementCallback> = self.subscribers.lock().clone();
        for callback in subscribers {
            if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| callback(version))) {
                warn!(
                    version = %version,
                    reason = %panic_message(panic.as_ref()),
                    "Announcement subscriber panicked"
                );
            }
        }
    }
}

impl Announcer for InMemoryAnnouncement {
    fn announce(&self, version: Version) -> RelayResult<()> {
        let effective = {
            let mut state = self.state.write();
            state.latest = version;
            state.effective()
        };
        self.notify(effective);
        Ok(())
    }
}

impl AnnouncementWatcher for InMemoryAnnouncement {
    fn latest_version(&self) -> RelayResult<Version> {
        Ok(self.state.read().effective())
    }

    fn pinned_version(&self) -> RelayResult<Option<Version>> {
        Ok(self.state.read().pinned)
    }

    fn subscribe(&self, callback: AnnouncementCallback) {
        self.subscribers.lock().push(callback);
    }
}

impl std::fmt::Debug for InMemoryAnnouncement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = *self.state.read();
        f.debug_struct("InMemoryAnnouncement")
            .field("latest", &state.latest)
            .field("pinned", &state.pinned)
            .field("subscribers", &self.subscribers.lock().len())
            .finish()
    }
}
