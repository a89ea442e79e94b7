use crate::services::fs_util::write_atomic;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::str::FromStr;

/// Independently switchable features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    GameBananaAuthorUpdate,
    HotkeyFinder,
    StatusKeeper,
    ModInfoBackup,
}

impl Function {
    pub const ALL: [Function; 4] = [
        Function::GameBananaAuthorUpdate,
        Function::HotkeyFinder,
        Function::StatusKeeper,
        Function::ModInfoBackup,
    ];

    /// File stem under `Settings/Functions/`.
    pub fn file_stem(self) -> &'static str {
        match self {
            Function::GameBananaAuthorUpdate => "GBAuthorUpdate",
            Function::HotkeyFinder => "HotkeyFinder",
            Function::StatusKeeper => "StatusKeeper",
            Function::ModInfoBackup => "ModInfoBackup",
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_stem())
    }
}

impl FromStr for Function {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.replace(['-', '_', ' '], "");
        Function::ALL
            .into_iter()
            .find(|function| {
                function.file_stem().eq_ignore_ascii_case(&wanted)
                    || format!("{function:?}").eq_ignore_ascii_case(&wanted)
            })
            .ok_or_else(|| format!("unknown function '{s}'"))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionState {
    enabled: bool,
}

/// `Settings/Functions/<Function>.json` toggles. Missing or unreadable files
/// count as enabled.
#[derive(Debug, Clone)]
pub struct FunctionRegistry {
    dir: Utf8PathBuf,
}

impl FunctionRegistry {
    pub fn new(dir: impl Into<Utf8PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    fn path(&self, function: Function) -> Utf8PathBuf {
        self.dir.join(format!("{}.json", function.file_stem()))
    }

    pub fn is_enabled(&self, function: Function) -> bool {
        let path = self.path(function);
        let Ok(raw) = fs::read_to_string(&path) else {
            return true;
        };
        match serde_json::from_str::<FunctionState>(&raw) {
            Ok(state) => state.enabled,
            Err(e) => {
                tracing::warn!("Malformed {}: {}, treating as enabled", path, e);
                true
            }
        }
    }

    pub fn set_enabled(&self, function: Function, enabled: bool) -> Result<()> {
        let json = serde_json::to_string_pretty(&FunctionState { enabled })
            .context("Failed to serialize function state")?;
        write_atomic(&self.path(function), json.as_bytes())?;
        tracing::info!("{} {}", function, if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    pub fn list(&self) -> Vec<(Function, bool)> {
        Function::ALL
            .into_iter()
            .map(|function| (function, self.is_enabled(function)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_means_enabled() {
        let temp = TempDir::new().unwrap();
        let registry = FunctionRegistry::new(Utf8PathBuf::try_from(temp.path().join("Functions")).unwrap());
        assert!(registry.list().iter().all(|(_, enabled)| *enabled));
    }

    #[test]
    fn test_set_enabled_round_trip() {
        let temp = TempDir::new().unwrap();
        let registry = FunctionRegistry::new(Utf8PathBuf::try_from(temp.path().join("Functions")).unwrap());

        registry.set_enabled(Function::StatusKeeper, false).unwrap();

        assert!(!registry.is_enabled(Function::StatusKeeper));
        assert!(registry.is_enabled(Function::HotkeyFinder));
        assert!(registry.dir().join("StatusKeeper.json").is_file());
    }

    #[test]
    fn test_parse_function_names() {
        assert_eq!("gb-author-update".parse::<Function>().unwrap(), Function::GameBananaAuthorUpdate);
        assert_eq!("status_keeper".parse::<Function>().unwrap(), Function::StatusKeeper);
        assert_eq!("ModInfoBackup".parse::<Function>().unwrap(), Function::ModInfoBackup);
        assert!("teleporter".parse::<Function>().is_err());
    }
}
