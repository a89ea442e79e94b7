//! Application context - the composition root.
//!
//! One [`AppContext`] is built at startup and handed to whatever drives the
//! application. It owns the resolved paths, the settings, the metadata
//! cache, the active-mods registry and the symlink manager, and exposes
//! the operations a front end needs on top of the services.

use crate::config::ConfigManager;
use crate::metrics::Metrics;
use crate::models::{AppPaths, AppSettings, ModRecord, Operation, ResultStatus};
use crate::services::author_update::{AuthorUpdateReport, UpdateMode, run_author_update};
use crate::services::functions::FunctionRegistry;
use crate::services::hotkeys::{HotkeyRefreshReport, refresh_mod_hotkeys, run_hotkey_refresh};
use crate::services::library::{Disposal, ModLibrary};
use crate::services::metadata::{MetadataCache, PREVIEW_CANDIDATES};
use crate::services::mod_info_backup::ModInfoBackup;
use crate::services::presets::{PresetLoadReport, PresetManager};
use crate::services::registry::ActiveModsRegistry;
use crate::services::scraper::AuthorScraper;
use crate::services::status_keeper::{StatusKeeperBackup, StatusKeeperRunner, StatusKeeperSync};
use crate::services::symlinks::{FixReport, LinkOutcome, SymlinkManager};
use crate::state::StateManager;
use anyhow::{Context, Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// Name of the settings directory under the base directory.
pub const SETTINGS_DIR: &str = "Settings";

const PREVIEW_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

pub struct AppContext {
    paths: AppPaths,
    settings: AppSettings,
    config: ConfigManager,
    state: StateManager,
    metrics: Arc<Metrics>,
    cache: Arc<MetadataCache>,
    library: ModLibrary,
    registry: Mutex<ActiveModsRegistry>,
    symlinks: SymlinkManager,
    presets: PresetManager,
    functions: FunctionRegistry,
}

impl AppContext {
    /// Load settings from `<base>/Settings` and wire up every component.
    pub fn load(base_dir: impl Into<Utf8PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        let config = ConfigManager::new(base_dir.join(SETTINGS_DIR))?;
        let settings = config.load_settings()?;
        Self::with_settings(base_dir, config, settings)
    }

    /// Wire up every component from already loaded settings.
    pub fn with_settings(
        base_dir: impl Into<Utf8PathBuf>,
        config: ConfigManager,
        settings: AppSettings,
    ) -> Result<Self> {
        let base_dir = base_dir.into();
        let paths = AppPaths::resolve(&base_dir, config.config_dir(), &settings);

        fs::create_dir_all(&paths.mod_library)
            .with_context(|| format!("Failed to create mod library: {}", paths.mod_library))?;

        let state = StateManager::new();
        state.set_paths(
            paths.mod_library.clone(),
            paths.game_mods.clone(),
            paths.d3dx_user_ini.clone(),
        );

        let registry = ActiveModsRegistry::load(&paths.active_mods_file);
        state.set_active_count(registry.active_count());

        tracing::info!(
            "Context ready: library={}, game mods={}, {} active mods",
            paths.mod_library,
            paths.game_mods,
            registry.active_count()
        );

        Ok(Self {
            library: ModLibrary::new(&paths.mod_library),
            symlinks: SymlinkManager::new(&paths.mod_library, &paths.game_mods),
            presets: PresetManager::new(&paths.presets_dir),
            functions: FunctionRegistry::new(&paths.functions_dir),
            registry: Mutex::new(registry),
            cache: Arc::new(MetadataCache::new()),
            metrics: Arc::new(Metrics::new()),
            state,
            config,
            settings,
            paths,
        })
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn cache(&self) -> &Arc<MetadataCache> {
        &self.cache
    }

    pub fn library(&self) -> &ModLibrary {
        &self.library
    }

    pub fn symlinks(&self) -> &SymlinkManager {
        &self.symlinks
    }

    pub fn presets(&self) -> &PresetManager {
        &self.presets
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    fn registry(&self) -> MutexGuard<'_, ActiveModsRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Library and metadata

    pub fn records(&self) -> Vec<ModRecord> {
        self.library.load_records(&self.cache)
    }

    pub fn record(&self, name: &str) -> Result<ModRecord> {
        let dir = self.mod_dir(name)?;
        Ok(self.cache.get(&dir))
    }

    /// Apply `edit` to a mod's record and save it.
    pub fn update_record(&self, name: &str, edit: impl FnOnce(&mut ModRecord)) -> Result<ModRecord> {
        let dir = self.mod_dir(name)?;
        let mut record = self.cache.get(&dir);
        edit(&mut record);
        record.normalize();
        self.cache.store(&dir, &record)?;
        Ok(record)
    }

    /// Replace a mod's preview with a copy of `image`.
    pub fn set_preview(&self, name: &str, image: &Utf8Path) -> Result<Utf8PathBuf> {
        let dir = self.mod_dir(name)?;
        let extension = image
            .extension()
            .map(str::to_ascii_lowercase)
            .filter(|ext| PREVIEW_EXTENSIONS.contains(&ext.as_str()))
            .with_context(|| format!("Unsupported preview image: {}", image))?;

        for candidate in PREVIEW_CANDIDATES {
            let existing = dir.join(candidate);
            if existing.is_file() {
                fs::remove_file(&existing)
                    .with_context(|| format!("Failed to remove {}", existing))?;
            }
        }

        let dest = dir.join(format!("preview.{extension}"));
        fs::copy(image, &dest).with_context(|| format!("Failed to copy {} to {}", image, dest))?;
        self.cache.invalidate(&dir);
        tracing::info!("Preview of {} set from {}", name, image);
        Ok(dest)
    }

    /// Delete a mod folder along with its link and registry entry.
    pub fn delete_mod(&self, name: &str, disposal: Disposal) -> Result<()> {
        let dir = self.mod_dir(name)?;
        let mut registry = self.registry();

        let unlinked = self.symlinks.remove_link(name)? == LinkOutcome::Removed;
        if let Err(e) = self.library.delete(name, disposal) {
            if unlinked {
                self.symlinks.create_link(name)?;
            }
            return Err(e);
        }
        if unlinked {
            self.metrics.record_links_removed(1);
        }

        self.cache.invalidate(&dir);
        registry.remove(name);
        self.state.mod_toggled(name, false, registry.active_count());
        Ok(())
    }

    /// Rename a mod folder, carrying its active flag and link over.
    pub fn rename_mod(&self, old: &str, new: &str) -> Result<()> {
        self.mod_dir(old)?;
        self.library.mod_dir(new)?;
        if old == new {
            return Ok(());
        }
        let mut registry = self.registry();

        let unlinked = self.symlinks.remove_link(old)? == LinkOutcome::Removed;
        let (from, to) = match self.library.rename(old, new) {
            Ok(paths) => paths,
            Err(e) => {
                if unlinked {
                    self.symlinks.create_link(old)?;
                }
                return Err(e);
            }
        };

        self.cache.invalidate(&from);
        self.cache.invalidate(&to);
        registry.rename(old, new);

        let relinked = registry.is_active(new)
            && self.symlinks.create_link(new)? == LinkOutcome::Created;
        self.record_link_change(unlinked, relinked);
        self.state.mod_toggled(new, registry.is_active(new), registry.active_count());
        Ok(())
    }

    fn mod_dir(&self, name: &str) -> Result<Utf8PathBuf> {
        let dir = self.library.mod_dir(name)?;
        if !dir.is_dir() {
            bail!("Mod '{}' not found in {}", name, self.library.root());
        }
        Ok(dir)
    }

    // Activation

    pub fn is_active(&self, name: &str) -> bool {
        self.registry().is_active(name)
    }

    pub fn active_names(&self) -> Vec<String> {
        self.registry().active_names()
    }

    /// Flip a mod between active and inactive. Returns the new state.
    pub fn toggle_mod(&self, name: &str) -> Result<bool> {
        let mut registry = self.registry();
        let was_linked = self.symlinks.is_linked(name);
        let active = self.symlinks.toggle(&mut registry, name)?;
        let linked = self.symlinks.is_linked(name);

        self.record_link_change(was_linked, linked);
        self.metrics.record_toggle();
        self.state.mod_toggled(name, active, registry.active_count());
        Ok(active)
    }

    pub fn activate_mod(&self, name: &str) -> Result<LinkOutcome> {
        let mut registry = self.registry();
        let outcome = self.symlinks.activate(&mut registry, name)?;
        if outcome == LinkOutcome::Created {
            self.metrics.record_links_created(1);
        }
        self.state.mod_toggled(name, registry.is_active(name), registry.active_count());
        Ok(outcome)
    }

    pub fn deactivate_mod(&self, name: &str) -> Result<LinkOutcome> {
        let mut registry = self.registry();
        let outcome = self.symlinks.deactivate(&mut registry, name)?;
        if outcome == LinkOutcome::Removed {
            self.metrics.record_links_removed(1);
        }
        self.state.mod_toggled(name, registry.is_active(name), registry.active_count());
        Ok(outcome)
    }

    fn record_link_change(&self, was_linked: bool, linked: bool) {
        match (was_linked, linked) {
            (false, true) => self.metrics.record_links_created(1),
            (true, false) => self.metrics.record_links_removed(1),
            _ => {}
        }
    }

    /// Reconcile links with the registry.
    pub fn validate_links(&self) -> Result<FixReport> {
        self.state.start_operation(Operation::LinkValidation, 0);
        let result = self.symlinks.validate_and_fix(&self.registry());
        self.state.finish_operation();

        let report = result?;
        self.metrics.record_links_created(report.created.len());
        self.metrics.record_links_removed(report.removed_orphans.len());
        Ok(report)
    }

    /// Move every link to a new game mods directory and save the setting.
    pub fn set_game_mods_dir(&mut self, new_dir: impl Into<Utf8PathBuf>) -> Result<usize> {
        let new_dir = new_dir.into();
        let new_dir = if new_dir.is_absolute() {
            new_dir
        } else {
            self.paths.base_dir.join(new_dir)
        };

        let created = {
            let registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
            self.symlinks.switch_game_mods_dir(&new_dir, &registry)?
        };

        self.settings.game_mods_dir = new_dir.to_string();
        self.config.save_settings(&self.settings)?;
        self.paths.game_mods = new_dir.clone();
        self.state.set_game_mods_dir(new_dir);
        self.metrics.record_links_created(created);
        Ok(created)
    }

    // Presets

    pub fn save_preset(&self, name: &str) -> Result<()> {
        self.presets.save(name, &self.registry())
    }

    pub fn load_preset(&self, name: &str) -> Result<PresetLoadReport> {
        self.state.start_operation(Operation::PresetLoad, 0);
        let result = {
            let mut registry = self.registry();
            self.presets.load(name, &mut registry, &self.symlinks)
        };
        self.state.finish_operation();

        let report = result?;
        self.metrics.record_links_removed(report.links_removed);
        self.metrics.record_links_created(report.links_created);
        self.state.set_active_count(report.active);
        Ok(report)
    }

    pub fn delete_preset(&self, name: &str) -> Result<()> {
        self.presets.delete(name)
    }

    /// Preset names, writing the default preset first.
    pub fn list_presets(&self) -> Result<Vec<String>> {
        self.presets.ensure_default(&self.library, &self.cache)?;
        Ok(self.presets.list())
    }

    // Functions

    pub async fn update_authors(
        &self,
        mode: UpdateMode,
        cancel_rx: &watch::Receiver<bool>,
    ) -> Result<AuthorUpdateReport> {
        let scraper = AuthorScraper::new(self.settings.http_timeout_secs)
            .context("Failed to create HTTP client")?;
        let report =
            run_author_update(&self.library, &self.cache, &scraper, mode, &self.state, cancel_rx)
                .await;
        self.metrics.record_authors_updated(report.updated.len());
        Ok(report)
    }

    pub fn refresh_hotkeys(&self, smart: bool, cancel_rx: &watch::Receiver<bool>) -> HotkeyRefreshReport {
        let report = run_hotkey_refresh(&self.library, &self.cache, smart, &self.state, cancel_rx);
        self.metrics.record_hotkeys_updated(report.updated.len());
        report
    }

    pub fn refresh_mod_hotkeys(&self, name: &str) -> Result<ResultStatus> {
        let dir = self.mod_dir(name)?;
        let status = refresh_mod_hotkeys(&self.cache, &dir, false)?;
        if status == ResultStatus::Updated {
            self.metrics.record_hotkeys_updated(1);
        }
        Ok(status)
    }

    pub fn status_keeper_sync(&self) -> StatusKeeperSync {
        StatusKeeperSync::new(self.library.clone(), &self.paths.d3dx_user_ini)
    }

    pub fn status_keeper_runner(&self) -> StatusKeeperRunner {
        StatusKeeperRunner::new(
            self.status_keeper_sync(),
            Arc::clone(&self.cache),
            self.state.clone(),
            Arc::clone(&self.metrics),
            self.settings.status_keeper.clone(),
        )
    }

    pub fn status_keeper_backup(&self) -> StatusKeeperBackup {
        StatusKeeperBackup::new(&self.paths.mod_library)
    }

    pub fn mod_info_backup(&self) -> ModInfoBackup {
        ModInfoBackup::new(&self.paths.backups_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::metadata::MOD_JSON;
    use tempfile::TempDir;

    fn context() -> (TempDir, AppContext) {
        let temp = TempDir::new().unwrap();
        let base = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
        let hat = base.join("ModLibrary").join("Hat");
        fs::create_dir_all(&hat).unwrap();
        fs::write(hat.join(MOD_JSON), r#"{"character":"Hero"}"#).unwrap();

        let config = ConfigManager::new(base.join(SETTINGS_DIR)).unwrap();
        let ctx = AppContext::with_settings(&base, config, AppSettings::default()).unwrap();
        (temp, ctx)
    }

    #[test]
    fn test_update_record_keeps_other_fields() {
        let (_temp, ctx) = context();
        let record = ctx.update_record("Hat", |r| r.author = "Jane".to_string()).unwrap();

        assert_eq!(record.character, "Hero");
        assert_eq!(ctx.record("Hat").unwrap().author, "Jane");
        assert!(ctx.record("Missing").is_err());
        assert!(ctx.record("..").is_err());
    }

    #[test]
    fn test_set_preview_replaces_existing() {
        let (temp, ctx) = context();
        let hat = ctx.library().root().join("Hat");
        fs::write(hat.join("preview.jpg"), b"old").unwrap();
        let image = Utf8PathBuf::try_from(temp.path().join("new.PNG")).unwrap();
        fs::write(&image, b"new").unwrap();

        let dest = ctx.set_preview("Hat", &image).unwrap();

        assert_eq!(dest, hat.join("preview.png"));
        assert!(!hat.join("preview.jpg").exists());
        assert_eq!(ctx.record("Hat").unwrap().preview, Some(hat.join("preview.png")));
    }

    #[cfg(unix)]
    #[test]
    fn test_toggle_updates_state_and_metrics() {
        let (_temp, ctx) = context();

        assert!(ctx.toggle_mod("Hat").unwrap());
        assert_eq!(ctx.state().snapshot().active_mods, 1);
        assert_eq!(ctx.metrics().links_created.load(std::sync::atomic::Ordering::Relaxed), 1);

        assert!(!ctx.toggle_mod("Hat").unwrap());
        assert_eq!(ctx.state().snapshot().active_mods, 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_set_game_mods_dir_moves_links_and_saves() {
        let (temp, mut ctx) = context();
        ctx.activate_mod("Hat").unwrap();
        let new_dir = Utf8PathBuf::try_from(temp.path().join("Elsewhere")).unwrap();

        assert_eq!(ctx.set_game_mods_dir(&new_dir).unwrap(), 1);
        assert!(crate::services::symlinks::is_dir_link(&new_dir.join("Hat")));

        let reloaded = AppContext::load(&ctx.paths().base_dir).unwrap();
        assert_eq!(reloaded.paths().game_mods, new_dir);
    }
}
