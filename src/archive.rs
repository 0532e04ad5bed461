//! Moves weekly files that are no longer current out of the data directory.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{Error, Result};

/// Moves every `.xlsx` file in `data_dir` except `current_name` into
/// `archive_dir`, keeping its file name. Both directories are created if
/// missing. Returns the archived paths; empty once nothing stale is left.
pub fn archive_stale(data_dir: &Path, archive_dir: &Path, current_name: &str) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(data_dir).map_err(|e| Error::io(data_dir, e))?;
    fs::create_dir_all(archive_dir).map_err(|e| Error::io(archive_dir, e))?;

    let mut moved = Vec::new();
    for entry in fs::read_dir(data_dir).map_err(|e| Error::io(data_dir, e))? {
        let entry = entry.map_err(|e| Error::io(data_dir, e))?;
        let file_type = entry.file_type().map_err(|e| Error::io(entry.path(), e))?;
        if !file_type.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !name.ends_with(".xlsx") || name == current_name {
            continue;
        }

        let src = entry.path();
        let dst = archive_dir.join(name);
        move_file(&src, &dst)?;
        info!(from = %src.display(), to = %dst.display(), "archived stale weekly file");
        moved.push(dst);
    }
    Ok(moved)
}

/// Rename, falling back to copy + remove when the rename is refused
/// (e.g. the archive lives on another filesystem).
fn move_file(src: &Path, dst: &Path) -> Result<()> {
    if let Err(err) = fs::rename(src, dst) {
        warn!(error = %err, src = %src.display(), "rename failed, copying instead");
        fs::copy(src, dst).map_err(|e| Error::io(dst, e))?;
        fs::remove_file(src).map_err(|e| Error::io(src, e))?;
    }
    Ok(())
}
