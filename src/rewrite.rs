//! Replace a file's content through a sibling temporary file.
//!
//! Both store writers go through [`rewrite_file`]: read the current bytes, let a pure
//! transform produce the new bytes, write them to `<path>.temp`, then rename over the
//! original. The rename is the only step that touches the original, so any earlier failure
//! leaves it byte-identical.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{MetadataError, Result};

pub const TEMP_SUFFIX: &str = ".temp";

/// `<path>.temp`, next to the original so the rename stays on one filesystem.
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

/// Rewrite `path` with the bytes produced by `transform`.
///
/// A leftover temp file from an interrupted earlier attempt is removed first.
pub fn rewrite_file<F>(path: &Path, transform: F) -> Result<()>
where
    F: FnOnce(Vec<u8>) -> anyhow::Result<Vec<u8>>,
{
    let temp = temp_path(path);
    if temp.exists() {
        log::warn!("Removing stale temp file {}", temp.display());
        fs::remove_file(&temp).map_err(|e| MetadataError::io(&temp, e))?;
    }

    let original = fs::read(path).map_err(|e| MetadataError::io(path, e))?;
    let updated = transform(original).map_err(|source| MetadataError::Rewrite {
        path: path.to_path_buf(),
        source,
    })?;

    if let Err(e) = write_synced(&temp, &updated) {
        discard(&temp);
        return Err(MetadataError::io(&temp, e));
    }

    if let Err(e) = fs::rename(&temp, path) {
        discard(&temp);
        return Err(MetadataError::io(path, e));
    }

    log::debug!("Rewrote {} ({} bytes)", path.display(), updated.len());
    Ok(())
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn discard(temp: &Path) {
    if let Err(e) = fs::remove_file(temp) {
        log::debug!("Could not remove temp file {}: {e}", temp.display());
    }
}
