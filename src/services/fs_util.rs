use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::time::{SystemTime, UNIX_EPOCH};

/// Write `contents` to `path` through a sibling temp file and a rename, so a
/// reader never observes a half-written file.
pub fn write_atomic(path: &Utf8Path, contents: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("No parent directory for {}", path))?;
    if !parent.as_str().is_empty() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent))?;
    }

    let file_name = path
        .file_name()
        .with_context(|| format!("No file name in {}", path))?;
    let mut temp_path = parent.join(format!("{file_name}.tmp"));
    if temp_path.exists() {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        temp_path = parent.join(format!("{file_name}.{stamp}.tmp"));
    }

    fs::write(&temp_path, contents)
        .with_context(|| format!("Failed to write temp file: {}", temp_path))?;
    fs::rename(&temp_path, path).with_context(|| format!("Failed to finalize {}", path))?;
    Ok(())
}

/// Convert a std path from walkdir or read_dir into a UTF-8 path, skipping
/// entries that are not valid UTF-8.
pub fn utf8_path(path: std::path::PathBuf) -> Option<Utf8PathBuf> {
    match Utf8PathBuf::from_path_buf(path) {
        Ok(path) => Some(path),
        Err(path) => {
            tracing::warn!("Skipping non UTF-8 path: {}", path.display());
            None
        }
    }
}

/// Modification time of `path`, or `None` when it cannot be read.
pub fn modified_time(path: &Utf8Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Copy a directory tree file by file, creating directories as needed.
pub fn copy_dir_all(from: &Utf8Path, to: &Utf8Path) -> Result<usize> {
    let mut copied = 0;
    for entry in walkdir::WalkDir::new(from) {
        let entry = entry.with_context(|| format!("Failed to walk {}", from))?;
        let Some(path) = utf8_path(entry.path().to_path_buf()) else {
            continue;
        };
        let relative = path
            .strip_prefix(from)
            .with_context(|| format!("{} is outside {}", path, from))?;
        let dest = to.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest)
                .with_context(|| format!("Failed to create directory: {}", dest))?;
        } else if entry.file_type().is_file() {
            fs::copy(&path, &dest)
                .with_context(|| format!("Failed to copy {} to {}", path, dest))?;
            copied += 1;
        }
    }
    Ok(copied)
}
