use crate::models::ModRecord;
use crate::services::fs_util::utf8_path;
use crate::services::metadata::MetadataCache;
use crate::services::path_safety::{PathSafetyError, is_safe_dir_name, safe_join};
use anyhow::{Context, Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::BTreeSet;
use std::fs;

/// What happens to a deleted mod folder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Disposal {
    /// Move it to the operating system's recycle bin
    #[default]
    RecycleBin,
    Permanent,
}

/// The mod library: one subdirectory per mod.
#[derive(Debug, Clone)]
pub struct ModLibrary {
    root: Utf8PathBuf,
}

impl ModLibrary {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Mod directory names, sorted. Hidden and unsafe names are skipped.
    pub fn list_mod_dirs(&self) -> Vec<String> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!("Cannot list mod library {}: {}", self.root, e);
                return Vec::new();
            }
        };

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| utf8_path(entry.path()))
            .filter_map(|path| path.file_name().map(str::to_string))
            .filter(|name| !name.starts_with('.'))
            .filter(|name| {
                let safe = is_safe_dir_name(name);
                if !safe {
                    tracing::warn!("Skipping mod directory with unsafe name: {}", name);
                }
                safe
            })
            .collect();

        names.sort();
        names
    }

    /// Path of a mod directory, validating the name first.
    pub fn mod_dir(&self, name: &str) -> Result<Utf8PathBuf, PathSafetyError> {
        safe_join(&self.root, name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.mod_dir(name).is_ok_and(|dir| dir.is_dir())
    }

    /// Remove a mod folder. Returns the path it had.
    pub fn delete(&self, name: &str, disposal: Disposal) -> Result<Utf8PathBuf> {
        let dir = self.mod_dir(name)?;
        if !dir.is_dir() {
            bail!("Mod '{}' not found in {}", name, self.root);
        }

        match disposal {
            Disposal::RecycleBin => trash::delete(dir.as_std_path())
                .with_context(|| format!("Failed to move {} to the recycle bin", dir))?,
            Disposal::Permanent => {
                fs::remove_dir_all(&dir).with_context(|| format!("Failed to delete {}", dir))?
            }
        }

        tracing::info!("Deleted mod {} ({:?})", name, disposal);
        Ok(dir)
    }

    /// Rename a mod folder. Returns the old and new paths.
    ///
    /// A change of case only is allowed even where the filesystem treats both
    /// names as the same entry.
    pub fn rename(&self, old: &str, new: &str) -> Result<(Utf8PathBuf, Utf8PathBuf)> {
        let from = self.mod_dir(old)?;
        let to = self.mod_dir(new)?;
        if !from.is_dir() {
            bail!("Mod '{}' not found in {}", old, self.root);
        }
        if old == new {
            return Ok((from, to));
        }
        if fs::symlink_metadata(&to).is_ok() && !old.eq_ignore_ascii_case(new) {
            bail!("A mod named '{}' already exists", new);
        }

        fs::rename(&from, &to).with_context(|| format!("Failed to rename {} to {}", from, to))?;
        tracing::info!("Renamed mod {} to {}", old, new);
        Ok((from, to))
    }

    /// Records of every mod, through the cache.
    pub fn load_records(&self, cache: &MetadataCache) -> Vec<ModRecord> {
        self.list_mod_dirs()
            .iter()
            .map(|name| cache.get(&self.root.join(name)))
            .collect()
    }

    /// Distinct characters across the library.
    pub fn characters(&self, cache: &MetadataCache) -> BTreeSet<String> {
        self.load_records(cache)
            .into_iter()
            .map(|record| record.character)
            .collect()
    }
}
