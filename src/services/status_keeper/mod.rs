//! Status Keeper: keeps per-mod INI `[Constants]` in step with the values the
//! game persisted into `d3dx_user.ini`, and manages `.ini.msk` backups.
//!
//! A sync cycle runs ParseSource, ResolveTargets, RewriteMainFiles and
//! RewriteLodFiles in order. See [`sync::run_sync`].

pub mod backup;
pub mod constants;
pub mod lod;
pub mod resolve;
pub mod source;
pub mod sync;
pub mod watcher;

pub use backup::{BackupError, BackupReport, SafetyOverrides, StatusKeeperBackup};
pub use sync::{StatusKeeperSync, SyncPhase, SyncReport, run_sync};
pub use watcher::{StatusKeeperRunner, SyncTrigger};

use camino::Utf8Path;

/// Extension appended to an `.ini` for its backup copy.
pub const MSK_EXTENSION: &str = "msk";

/// LOD variants carry `_lod` in their file name.
pub fn is_lod_file(path: &Utf8Path) -> bool {
    path.file_name()
        .is_some_and(|name| name.to_ascii_lowercase().contains("_lod"))
}

pub(crate) fn is_ini_file(path: &Utf8Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("ini"))
}
