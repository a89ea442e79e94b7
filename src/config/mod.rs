use crate::models::AppSettings;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// Name of the settings file inside the settings directory.
pub const SETTINGS_FILE: &str = "Settings.yaml";

/// Prefix for environment overrides, e.g. `XXMM_GAME_MODS_DIR` or
/// `XXMM_STATUS_KEEPER__POLL_INTERVAL_SECS`.
pub const ENV_PREFIX: &str = "XXMM";

/// Configuration manager for loading and saving the settings file.
///
/// Owns the settings directory (`<base>/Settings`), which also holds
/// `ActiveMods.json`, the `Functions/` toggles and, by default, `Presets/`.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    settings_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager, creating the directory when missing.
    ///
    /// # Arguments
    /// * `config_dir` - Directory containing the settings (e.g., "Settings")
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            settings_path: config_dir.join(SETTINGS_FILE),
            config_dir,
        })
    }

    /// Load the settings.
    ///
    /// Layers the YAML file (optional) under `XXMM_*` environment overrides;
    /// keys missing from both take the [`AppSettings`] defaults.
    pub fn load_settings(&self) -> Result<AppSettings> {
        if !self.settings_path.exists() {
            tracing::warn!(
                "Settings file not found at {}, using defaults",
                self.settings_path
            );
        }

        let layered = config::Config::builder()
            .add_source(
                config::File::from(self.settings_path.as_std_path())
                    .format(config::FileFormat::Yaml)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read settings: {}", self.settings_path))?;

        let settings: AppSettings = layered
            .try_deserialize()
            .with_context(|| format!("Failed to parse settings: {}", self.settings_path))?;

        tracing::info!("Loaded settings from {}", self.settings_path);
        Ok(settings)
    }

    /// Save the settings file.
    pub fn save_settings(&self, settings: &AppSettings) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(settings).context("Failed to serialize settings to YAML")?;

        fs::write(&self.settings_path, yaml_string)
            .with_context(|| format!("Failed to write settings: {}", self.settings_path))?;

        tracing::info!("Saved settings to {}", self.settings_path);
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn settings_path(&self) -> &Utf8Path {
        &self.settings_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_config_manager() -> (ConfigManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let manager = ConfigManager::new(&config_path).unwrap();
        (manager, temp_dir)
    }

    #[test]
    fn test_create_config_manager() {
        let (manager, _temp_dir) = create_test_config_manager();
        assert!(manager.settings_path().as_str().ends_with(SETTINGS_FILE));
    }

    #[test]
    fn test_load_missing_settings_gives_defaults() {
        let (manager, _temp_dir) = create_test_config_manager();

        let loaded = manager.load_settings().unwrap();
        assert_eq!(loaded.mod_library_dir, AppSettings::default().mod_library_dir);
    }

    #[test]
    fn test_load_save_settings() {
        let (manager, _temp_dir) = create_test_config_manager();

        let mut settings = AppSettings::default();
        settings.game_mods_dir = "D:/XXMI/ZZMI/Mods".to_string();
        settings.status_keeper.poll_interval_secs = 30;
        manager.save_settings(&settings).unwrap();

        let loaded = manager.load_settings().unwrap();
        assert_eq!(loaded.game_mods_dir, "D:/XXMI/ZZMI/Mods");
        assert_eq!(loaded.status_keeper.poll_interval_secs, 30);
        assert_eq!(loaded.http_timeout_secs, 10);
    }
}
