use crate::services::fs_util::utf8_path;
use crate::services::library::ModLibrary;
use crate::services::metadata::{MOD_JSON, MetadataCache, PREVIEW_CANDIDATES};
use crate::services::path_safety::is_safe_dir_name;
use anyhow::{Context, Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// Number of backup sets kept. Set 1 is the newest.
pub const MAX_BACKUP_SETS: u32 = 3;

const MOD_INFO_DIR: &str = "ModInfo";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModInfoReport {
    pub mods: usize,
    pub files: usize,
}

/// Numbered, rotated copies of every mod's `mod.json` and preview image
/// under `<backups>/ModInfo/<n>/<mod>/`.
#[derive(Debug, Clone)]
pub struct ModInfoBackup {
    root: Utf8PathBuf,
}

impl ModInfoBackup {
    pub fn new(backups_dir: &Utf8Path) -> Self {
        Self {
            root: backups_dir.join(MOD_INFO_DIR),
        }
    }

    pub fn set_dir(&self, set: u32) -> Utf8PathBuf {
        self.root.join(set.to_string())
    }

    /// Available set numbers, ascending.
    pub fn list(&self) -> Vec<u32> {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return Vec::new();
        };
        let mut sets: Vec<u32> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().to_str()?.parse().ok())
            .filter(|set| (1..=MAX_BACKUP_SETS).contains(set))
            .collect();
        sets.sort_unstable();
        sets
    }

    /// Shift existing sets down by one (dropping the oldest) and write a new
    /// set 1 from the library.
    pub fn backup(&self, library: &ModLibrary) -> Result<ModInfoReport> {
        self.rotate()?;
        let target = self.set_dir(1);
        fs::create_dir_all(&target)
            .with_context(|| format!("Failed to create backup set: {}", target))?;

        let mut report = ModInfoReport::default();
        for name in library.list_mod_dirs() {
            let source = library.root().join(&name);
            let files = info_files(&source);
            if files.is_empty() {
                continue;
            }

            let dest = target.join(&name);
            fs::create_dir_all(&dest)
                .with_context(|| format!("Failed to create {}", dest))?;
            for file in files {
                let Some(file_name) = file.file_name() else {
                    continue;
                };
                fs::copy(&file, dest.join(file_name))
                    .with_context(|| format!("Failed to back up {}", file))?;
                report.files += 1;
            }
            report.mods += 1;
        }

        tracing::info!(
            "Mod info backup: {} files from {} mods into {}",
            report.files,
            report.mods,
            target
        );
        Ok(report)
    }

    fn rotate(&self) -> Result<()> {
        let oldest = self.set_dir(MAX_BACKUP_SETS);
        if oldest.exists() {
            fs::remove_dir_all(&oldest)
                .with_context(|| format!("Failed to drop oldest backup set: {}", oldest))?;
        }

        for set in (1..MAX_BACKUP_SETS).rev() {
            let from = self.set_dir(set);
            if from.exists() {
                let to = self.set_dir(set + 1);
                fs::rename(&from, &to)
                    .with_context(|| format!("Failed to rotate {} to {}", from, to))?;
            }
        }
        Ok(())
    }

    /// Copy set `set` back into the library. Mods no longer in the library
    /// are skipped.
    pub fn restore(&self, set: u32, library: &ModLibrary, cache: &MetadataCache) -> Result<ModInfoReport> {
        let source = self.set_dir(set);
        if !source.is_dir() {
            bail!("Backup set {} does not exist", set);
        }

        let mut report = ModInfoReport::default();
        for entry in fs::read_dir(&source).with_context(|| format!("Failed to read {}", source))? {
            let entry = entry.with_context(|| format!("Failed to read {}", source))?;
            let Some(backup_dir) = utf8_path(entry.path()) else {
                continue;
            };
            let Some(name) = backup_dir.file_name().map(str::to_string) else {
                continue;
            };
            if !backup_dir.is_dir() || !is_safe_dir_name(&name) {
                continue;
            }
            if !library.contains(&name) {
                tracing::warn!("Skipping restore of {}: not in the library", name);
                continue;
            }

            let mod_dir = library.root().join(&name);
            for file in info_files(&backup_dir) {
                let Some(file_name) = file.file_name() else {
                    continue;
                };
                fs::copy(&file, mod_dir.join(file_name))
                    .with_context(|| format!("Failed to restore {}", file))?;
                report.files += 1;
            }
            cache.invalidate(&mod_dir);
            report.mods += 1;
        }

        tracing::info!("Restored {} mods from backup set {}", report.mods, set);
        Ok(report)
    }

    pub fn delete_all(&self) -> Result<()> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root)
                .with_context(|| format!("Failed to delete {}", self.root))?;
        }
        tracing::info!("Deleted all mod info backups");
        Ok(())
    }
}

fn info_files(dir: &Utf8Path) -> Vec<Utf8PathBuf> {
    std::iter::once(MOD_JSON)
        .chain(PREVIEW_CANDIDATES.iter().copied())
        .map(|name| dir.join(name))
        .filter(|path| path.is_file())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, ModLibrary, ModInfoBackup) {
        let temp = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
        let library = root.join("ModLibrary");
        fs::create_dir_all(library.join("Hat")).unwrap();
        fs::write(library.join("Hat").join(MOD_JSON), r#"{"author":"Jane"}"#).unwrap();
        fs::write(library.join("Hat").join("preview.png"), b"png").unwrap();
        fs::create_dir_all(library.join("Empty")).unwrap();
        (temp, ModLibrary::new(library), ModInfoBackup::new(&root.join("Backups")))
    }

    #[test]
    fn test_backup_and_rotation() {
        let (_temp, library, backups) = setup();

        for _ in 0..4 {
            backups.backup(&library).unwrap();
        }

        assert_eq!(backups.list(), vec![1, 2, 3]);
        assert!(!backups.set_dir(4).exists());
        assert!(backups.set_dir(1).join("Hat").join("preview.png").is_file());
        assert!(!backups.set_dir(1).join("Empty").exists());
    }

    #[test]
    fn test_restore_invalidates_cache() {
        let (_temp, library, backups) = setup();
        let cache = MetadataCache::new();
        let hat = library.root().join("Hat");

        backups.backup(&library).unwrap();
        let mut record = cache.get(&hat);
        record.author = "Changed".to_string();
        cache.store(&hat, &record).unwrap();

        let report = backups.restore(1, &library, &cache).unwrap();

        assert_eq!(report.mods, 1);
        assert_eq!(cache.get(&hat).author, "Jane");
    }

    #[test]
    fn test_restore_missing_set_and_delete_all() {
        let (_temp, library, backups) = setup();
        let cache = MetadataCache::new();
        assert!(backups.restore(2, &library, &cache).is_err());

        backups.backup(&library).unwrap();
        backups.delete_all().unwrap();
        assert!(backups.list().is_empty());
    }
}
