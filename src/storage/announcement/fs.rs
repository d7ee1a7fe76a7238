use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{RelayError, RelayResult};
use crate::storage::announcement::{AnnouncementWatcher, Announcer};
use crate::storage::fs::write_atomic;
use crate::types::Version;

const ANNOUNCED_FILE: &str = "announced.version";
const PINNED_FILE: &str = "pinned.version";

/// Announcement channel stored as two small text files holding decimal
/// versions. Watchers poll; subscriptions are not supported.
#[derive(Debug, Clone)]
pub struct FilesystemAnnouncement {
    dir: PathBuf,
}

impl FilesystemAnnouncement {
    pub fn new(dir: impl Into<PathBuf>) -> RelayResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn pin(&self, version: Version) -> RelayResult<()> {
        write_version(&self.dir.join(PINNED_FILE), version)
    }

    pub fn unpin(&self) -> RelayResult<()> {
        match fs::remove_file(self.dir.join(PINNED_FILE)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

impl Announcer for FilesystemAnnouncement {
    fn announce(&self, version: Version) -> RelayResult<()> {
        write_version(&self.dir.join(ANNOUNCED_FILE), version)
    }
}

impl AnnouncementWatcher for FilesystemAnnouncement {
    fn latest_version(&self) -> RelayResult<Version> {
        if let Some(pinned) = self.pinned_version()? {
            return Ok(pinned);
        }
        Ok(read_version(&self.dir.join(ANNOUNCED_FILE))?.unwrap_or(Version::NONE))
    }

    fn pinned_version(&self) -> RelayResult<Option<Version>> {
        read_version(&self.dir.join(PINNED_FILE))
    }
}

fn write_version(path: &Path, version: Version) -> RelayResult<()> {
    if !version.is_concrete() {
        return Err(RelayError::InvalidTarget { target: version });
    }
    write_atomic(path, version.get().to_string().as_bytes())
}

fn read_version(path: &Path) -> RelayResult<Option<Version>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    raw.trim()
        .parse::<u64>()
        .map(|value| Some(Version::new(value)))
        .map_err(|err| {
            RelayError::catalog(format!(
                "malformed version file {}: {err}",
                path.display()
            ))
        })
}
