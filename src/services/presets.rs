use crate::models::DEFAULT_CHARACTER;
use crate::services::fs_util::{utf8_path, write_atomic};
use crate::services::library::ModLibrary;
use crate::services::metadata::MetadataCache;
use crate::services::path_safety::validate_dir_name;
use crate::services::registry::ActiveModsRegistry;
use crate::services::symlinks::SymlinkManager;
use anyhow::{Context, Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use std::fs;

/// Name of the preset synthesized from the library.
pub const DEFAULT_PRESET: &str = "Default Preset";

/// Outcome of loading a preset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PresetLoadReport {
    pub links_removed: usize,
    pub links_created: usize,
    pub active: usize,
}

/// Named snapshots of the active-mods registry, one JSON file each.
#[derive(Debug, Clone)]
pub struct PresetManager {
    dir: Utf8PathBuf,
}

impl PresetManager {
    pub fn new(dir: impl Into<Utf8PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    fn preset_path(&self, name: &str) -> Result<Utf8PathBuf> {
        validate_dir_name(name).with_context(|| format!("Invalid preset name '{}'", name))?;
        Ok(self.dir.join(format!("{name}.json")))
    }

    /// Preset names, sorted.
    pub fn list(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| utf8_path(entry.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json")))
            .filter_map(|path| path.file_stem().map(str::to_string))
            .collect();
        names.sort();
        names
    }

    pub fn exists(&self, name: &str) -> bool {
        self.preset_path(name).is_ok_and(|path| path.is_file())
    }

    /// Save the registry's current map under `name`.
    pub fn save(&self, name: &str, registry: &ActiveModsRegistry) -> Result<()> {
        self.write(name, registry.entries())
    }

    fn write(&self, name: &str, entries: &IndexMap<String, bool>) -> Result<()> {
        let path = self.preset_path(name)?;
        let json = serde_json::to_string_pretty(entries).context("Failed to serialize preset")?;
        write_atomic(&path, json.as_bytes())?;
        tracing::info!("Saved preset '{}' ({} entries)", name, entries.len());
        Ok(())
    }

    pub fn read(&self, name: &str) -> Result<IndexMap<String, bool>> {
        let path = self.preset_path(name)?;
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read preset: {}", path))?;
        serde_json::from_str(&raw).with_context(|| format!("Failed to parse preset: {}", path))
    }

    /// Apply a preset: drop every link, replace the registry, relink.
    pub fn load(
        &self,
        name: &str,
        registry: &mut ActiveModsRegistry,
        symlinks: &SymlinkManager,
    ) -> Result<PresetLoadReport> {
        let entries = self.read(name)?;

        let links_removed = symlinks.remove_all_links()?;
        registry.replace_all(entries);
        let links_created = symlinks.sync_from_registry(registry)?;

        let report = PresetLoadReport {
            links_removed,
            links_created,
            active: registry.active_count(),
        };
        tracing::info!("Loaded preset '{}': {:?}", name, report);
        Ok(report)
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        let path = self.preset_path(name)?;
        if !path.exists() {
            bail!("Preset '{}' does not exist", name);
        }
        fs::remove_file(&path).with_context(|| format!("Failed to delete preset: {}", path))?;
        tracing::info!("Deleted preset '{}'", name);
        Ok(())
    }

    /// Every mod with a real character, mapped to inactive.
    pub fn default_preset(library: &ModLibrary, cache: &MetadataCache) -> IndexMap<String, bool> {
        library
            .load_records(cache)
            .into_iter()
            .filter(|record| record.character != DEFAULT_CHARACTER)
            .map(|record| (record.name, false))
            .collect()
    }

    /// Write the default preset from the current library.
    pub fn ensure_default(&self, library: &ModLibrary, cache: &MetadataCache) -> Result<()> {
        let entries = Self::default_preset(library, cache);
        self.write(DEFAULT_PRESET, &entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::metadata::MOD_JSON;
    use tempfile::TempDir;

    fn root() -> (TempDir, Utf8PathBuf) {
        let temp = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
        (temp, root)
    }

    #[test]
    fn test_save_list_delete() {
        let (_temp, root) = root();
        let presets = PresetManager::new(root.join("Presets"));
        let mut registry = ActiveModsRegistry::load(root.join("ActiveMods.json"));
        registry.set("Foo", true);

        presets.save("Evening", &registry).unwrap();
        assert_eq!(presets.list(), vec!["Evening"]);
        assert_eq!(presets.read("Evening").unwrap().get("Foo"), Some(&true));

        presets.delete("Evening").unwrap();
        assert!(presets.list().is_empty());
        assert!(presets.delete("Evening").is_err());
    }

    #[test]
    fn test_rejects_unsafe_preset_name() {
        let (_temp, root) = root();
        let presets = PresetManager::new(root.join("Presets"));
        assert!(presets.read("../ActiveMods").is_err());
    }

    #[test]
    fn test_default_preset_excludes_other() {
        let (_temp, root) = root();
        let library_root = root.join("ModLibrary");
        for (name, json) in [("HeroHat", r#"{"character":"Hero"}"#), ("Shader", "{}")] {
            fs::create_dir_all(library_root.join(name)).unwrap();
            fs::write(library_root.join(name).join(MOD_JSON), json).unwrap();
        }
        let library = ModLibrary::new(&library_root);
        let cache = MetadataCache::new();

        let preset = PresetManager::default_preset(&library, &cache);
        assert_eq!(preset.len(), 1);
        assert_eq!(preset.get("HeroHat"), Some(&false));

        let presets = PresetManager::new(root.join("Presets"));
        presets.ensure_default(&library, &cache).unwrap();
        assert!(presets.exists(DEFAULT_PRESET));
    }
}
