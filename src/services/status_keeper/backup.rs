//! `.ini.msk` backups of every mod INI in the library.

use super::{MSK_EXTENSION, is_ini_file, is_lod_file};
use crate::services::fs_util::utf8_path;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BackupError {
    #[error("all three safety overrides must be enabled first")]
    SafetyLocked,

    #[error("mod library not found: {0}")]
    LibraryMissing(Utf8PathBuf),
}

/// Three independent confirmations guarding restore and delete. They are
/// cleared again after every successful destructive run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SafetyOverrides {
    pub first: bool,
    pub second: bool,
    pub third: bool,
}

impl SafetyOverrides {
    pub fn all() -> Self {
        Self {
            first: true,
            second: true,
            third: true,
        }
    }

    pub fn all_enabled(&self) -> bool {
        self.first && self.second && self.third
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupReport {
    pub processed: usize,
    pub skipped: usize,
    pub failed: Vec<Utf8PathBuf>,
}

#[derive(Debug, Clone)]
pub struct StatusKeeperBackup {
    library_root: Utf8PathBuf,
}

impl StatusKeeperBackup {
    pub fn new(library_root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            library_root: library_root.into(),
        }
    }

    /// Copy every eligible `.ini` to `<file>.ini.msk`. Existing backups are
    /// never overwritten.
    pub fn backup(&self) -> Result<BackupReport> {
        let mut report = BackupReport::default();

        for ini in self.files(is_ini_file)? {
            if self.is_excluded(&ini) {
                continue;
            }
            let msk = msk_path(&ini);
            if msk.exists() {
                report.skipped += 1;
                continue;
            }
            match fs::copy(&ini, &msk) {
                Ok(_) => report.processed += 1,
                Err(e) => {
                    tracing::warn!("Failed to back up {}: {}", ini, e);
                    report.failed.push(ini);
                }
            }
        }

        tracing::info!(
            "Status Keeper backup: {} created, {} already present, {} failed",
            report.processed,
            report.skipped,
            report.failed.len()
        );
        Ok(report)
    }

    /// Copy every `.msk` back over its `.ini`.
    pub fn restore(&self, overrides: &mut SafetyOverrides) -> Result<BackupReport> {
        if !overrides.all_enabled() {
            return Err(BackupError::SafetyLocked.into());
        }

        let mut report = BackupReport::default();
        for msk in self.files(is_msk_file)? {
            let ini = msk.with_extension("");
            match fs::copy(&msk, &ini) {
                Ok(_) => report.processed += 1,
                Err(e) => {
                    tracing::warn!("Failed to restore {}: {}", ini, e);
                    report.failed.push(msk);
                }
            }
        }

        overrides.reset();
        tracing::info!(
            "Status Keeper restore: {} restored, {} failed",
            report.processed,
            report.failed.len()
        );
        Ok(report)
    }

    /// Remove every `.msk` backup.
    pub fn delete(&self, overrides: &mut SafetyOverrides) -> Result<BackupReport> {
        if !overrides.all_enabled() {
            return Err(BackupError::SafetyLocked.into());
        }

        let mut report = BackupReport::default();
        for msk in self.files(is_msk_file)? {
            match fs::remove_file(&msk) {
                Ok(()) => report.processed += 1,
                Err(e) => {
                    tracing::warn!("Failed to delete {}: {}", msk, e);
                    report.failed.push(msk);
                }
            }
        }

        overrides.reset();
        tracing::info!("Status Keeper: deleted {} backups", report.processed);
        Ok(report)
    }

    /// LOD files and anything with `disabled` (any case) in its path below
    /// the library are left out of backups.
    fn is_excluded(&self, path: &Utf8Path) -> bool {
        let relative = path.strip_prefix(&self.library_root).unwrap_or(path);
        is_lod_file(path)
            || relative
                .components()
                .any(|c| c.as_str().to_ascii_lowercase().contains("disabled"))
    }

    fn files(&self, filter: impl Fn(&Utf8Path) -> bool) -> Result<Vec<Utf8PathBuf>> {
        if !self.library_root.is_dir() {
            return Err(BackupError::LibraryMissing(self.library_root.clone()).into());
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.library_root).follow_links(false) {
            let entry = entry.with_context(|| format!("Failed to scan {}", self.library_root))?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(path) = utf8_path(entry.into_path()) {
                if filter(&path) {
                    files.push(path);
                }
            }
        }
        Ok(files)
    }
}

fn msk_path(ini: &Utf8Path) -> Utf8PathBuf {
    Utf8PathBuf::from(format!("{ini}.{MSK_EXTENSION}"))
}

fn is_msk_file(path: &Utf8Path) -> bool {
    path.as_str()
        .to_ascii_lowercase()
        .ends_with(&format!(".ini.{MSK_EXTENSION}"))
}
