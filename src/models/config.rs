use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

/// User settings from `Settings/Settings.yaml`.
///
/// Relative paths are resolved against the application base directory by
/// [`AppPaths::resolve`]. Every key is optional; missing keys take the
/// defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Root of the mod library (one directory per mod)
    pub mod_library_dir: String,

    /// Game mods directory that receives the symlinks ("XXMIModsDirectory")
    pub game_mods_dir: String,

    /// Game-engine user config holding persisted variables
    pub d3dx_user_ini: String,

    pub presets_dir: String,

    pub backups_dir: String,

    pub language: String,

    /// Cap for a single GameBanana page fetch
    pub http_timeout_secs: u64,

    pub debug_mode: bool,

    /// Write log files as JSON lines
    pub log_json: bool,

    pub status_keeper: StatusKeeperSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusKeeperSettings {
    /// Start the watcher and timer when the `watch` command runs
    pub auto_sync: bool,

    pub poll_interval_secs: u64,

    /// Delay after a `d3dx_user.ini` change before syncing
    pub debounce_millis: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            mod_library_dir: "ModLibrary".to_string(),
            game_mods_dir: "XXMI/Mods".to_string(),
            d3dx_user_ini: "XXMI/d3dx_user.ini".to_string(),
            presets_dir: "Settings/Presets".to_string(),
            backups_dir: "Backups".to_string(),
            language: "en".to_string(),
            http_timeout_secs: default_http_timeout(),
            debug_mode: false,
            log_json: false,
            status_keeper: StatusKeeperSettings::default(),
        }
    }
}

impl Default for StatusKeeperSettings {
    fn default() -> Self {
        Self {
            auto_sync: true,
            poll_interval_secs: 10,
            debounce_millis: 500,
        }
    }
}

fn default_http_timeout() -> u64 {
    10
}

/// Absolute locations derived from [`AppSettings`] and the base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub base_dir: Utf8PathBuf,
    pub settings_dir: Utf8PathBuf,
    pub mod_library: Utf8PathBuf,
    pub game_mods: Utf8PathBuf,
    pub d3dx_user_ini: Utf8PathBuf,
    pub presets_dir: Utf8PathBuf,
    pub backups_dir: Utf8PathBuf,
    pub functions_dir: Utf8PathBuf,
    pub active_mods_file: Utf8PathBuf,
}

impl AppPaths {
    /// Resolve all configured paths; relative entries hang off `base_dir`.
    pub fn resolve(base_dir: &Utf8Path, settings_dir: &Utf8Path, settings: &AppSettings) -> Self {
        let resolve = |value: &str, fallback: &str| {
            let value = if value.trim().is_empty() { fallback } else { value };
            let path = Utf8Path::new(value);
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                base_dir.join(path)
            }
        };

        let defaults = AppSettings::default();

        Self {
            base_dir: base_dir.to_path_buf(),
            settings_dir: settings_dir.to_path_buf(),
            mod_library: resolve(&settings.mod_library_dir, &defaults.mod_library_dir),
            game_mods: resolve(&settings.game_mods_dir, &defaults.game_mods_dir),
            d3dx_user_ini: resolve(&settings.d3dx_user_ini, &defaults.d3dx_user_ini),
            presets_dir: resolve(&settings.presets_dir, &defaults.presets_dir),
            backups_dir: resolve(&settings.backups_dir, &defaults.backups_dir),
            functions_dir: settings_dir.join("Functions"),
            active_mods_file: settings_dir.join("ActiveMods.json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings = AppSettings::default();
        assert_eq!(settings.mod_library_dir, "ModLibrary");
        assert_eq!(settings.http_timeout_secs, 10);
        assert_eq!(settings.status_keeper.poll_interval_secs, 10);
        assert!(!settings.debug_mode);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let settings: AppSettings =
            serde_yaml_ng::from_str("game_mods_dir: D:/Games/XXMI/Mods\n").unwrap();
        assert_eq!(settings.game_mods_dir, "D:/Games/XXMI/Mods");
        assert_eq!(settings.mod_library_dir, "ModLibrary");
    }

    #[test]
    fn test_resolve_relative_paths() {
        let base = Utf8Path::new("/opt/xxmm");
        let paths = AppPaths::resolve(base, &base.join("Settings"), &AppSettings::default());

        assert_eq!(paths.mod_library, Utf8PathBuf::from("/opt/xxmm/ModLibrary"));
        assert_eq!(paths.game_mods, Utf8PathBuf::from("/opt/xxmm/XXMI/Mods"));
        assert_eq!(
            paths.active_mods_file,
            Utf8PathBuf::from("/opt/xxmm/Settings/ActiveMods.json")
        );
    }

    #[test]
    fn test_resolve_absolute_and_empty_paths() {
        let base = Utf8Path::new("/opt/xxmm");
        let settings = AppSettings {
            game_mods_dir: "/games/mods".to_string(),
            mod_library_dir: "  ".to_string(),
            ..AppSettings::default()
        };
        let paths = AppPaths::resolve(base, &base.join("Settings"), &settings);

        assert_eq!(paths.game_mods, Utf8PathBuf::from("/games/mods"));
        assert_eq!(paths.mod_library, Utf8PathBuf::from("/opt/xxmm/ModLibrary"));
    }
}
