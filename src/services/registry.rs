use crate::services::fs_util::write_atomic;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use std::fs;

/// `ActiveMods.json`: mod directory name to active flag.
///
/// A name missing from the map counts as inactive. Every mutation is written
/// back to disk immediately; a failed write is logged and the in-memory
/// state is kept.
#[derive(Debug, Clone)]
pub struct ActiveModsRegistry {
    path: Utf8PathBuf,
    entries: IndexMap<String, bool>,
}

impl ActiveModsRegistry {
    /// Load the registry, treating a missing or malformed file as empty.
    pub fn load(path: impl Into<Utf8PathBuf>) -> Self {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<IndexMap<String, bool>>(&raw) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!("Malformed {}: {}, starting empty", path, e);
                    IndexMap::new()
                }
            },
            Err(_) => {
                tracing::debug!("No registry at {}, starting empty", path);
                IndexMap::new()
            }
        };

        Self { path, entries }
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.entries.get(name).copied().unwrap_or(false)
    }

    /// Flip a mod's flag and persist. Returns the new state.
    pub fn toggle(&mut self, name: &str) -> bool {
        let new_state = !self.is_active(name);
        self.set(name, new_state);
        new_state
    }

    /// Set a mod's flag and persist.
    pub fn set(&mut self, name: &str, active: bool) {
        self.entries.insert(name.to_string(), active);
        self.persist();
    }

    /// Drop a mod's entry and persist. Returns its previous flag.
    pub fn remove(&mut self, name: &str) -> Option<bool> {
        let previous = self.entries.shift_remove(name);
        if previous.is_some() {
            self.persist();
        }
        previous
    }

    /// Move `old`'s flag to `new`, keeping its position, and persist.
    pub fn rename(&mut self, old: &str, new: &str) {
        if old == new || !self.entries.contains_key(old) {
            return;
        }
        self.entries.shift_remove(new);
        self.entries = std::mem::take(&mut self.entries)
            .into_iter()
            .map(|(name, active)| {
                if name == old {
                    (new.to_string(), active)
                } else {
                    (name, active)
                }
            })
            .collect();
        self.persist();
    }

    /// Names whose flag is `true`, in registry order.
    pub fn active_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, active)| **active)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.entries.values().filter(|active| **active).count()
    }

    pub fn entries(&self) -> &IndexMap<String, bool> {
        &self.entries
    }

    /// Replace the whole map and persist.
    pub fn replace_all(&mut self, entries: IndexMap<String, bool>) {
        self.entries = entries;
        self.persist();
    }

    pub fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.entries)
            .context("Failed to serialize active mods")?;
        write_atomic(&self.path, json.as_bytes())
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn persist(&self) {
        if let Err(e) = self.save() {
            tracing::warn!("Failed to persist {}: {:#}", self.path, e);
        }
    }
}
