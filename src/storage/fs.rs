//! Filesystem helpers shared by the filesystem catalog and announcement.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::error::RelayResult;

/// Flushes a directory's entries so a freshly renamed blob or version file
/// survives a crash.
pub fn sync_directory(path: &Path) -> RelayResult<()> {
    // Unix only; directory handles cannot be opened this way on Windows.
    #[cfg(unix)]
    File::open(path)?.sync_all()?;
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

/// Writes `bytes` to `path` through a sibling temp file and a rename, so
/// readers never observe a partially written file.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> RelayResult<()> {
    let tmp_path = path.with_extension("tmp");
    {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    if let Some(parent) = path.parent() {
        sync_directory(parent)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_atomic_replaces_content_and_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("value.version");
        write_atomic(&path, b"1").unwrap();
        write_atomic(&path, b"22").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"22");
        assert!(!dir.path().join("value.tmp").exists());
    }
}
