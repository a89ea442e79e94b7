use camino::Utf8PathBuf;
use std::collections::HashSet;
use std::fmt;

/// Long-running operations that report progress through the state manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    AuthorUpdate,
    HotkeyRefresh,
    StatusKeeperSync,
    StatusKeeperBackup,
    ModInfoBackup,
    PresetLoad,
    LinkValidation,
}

impl Operation {
    pub fn label(self) -> &'static str {
        match self {
            Operation::AuthorUpdate => "GameBanana author update",
            Operation::HotkeyRefresh => "Hotkey refresh",
            Operation::StatusKeeperSync => "Status Keeper sync",
            Operation::StatusKeeperBackup => "Status Keeper backup",
            Operation::ModInfoBackup => "Mod info backup",
            Operation::PresetLoad => "Preset load",
            Operation::LinkValidation => "Symlink validation",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome of processing one mod during a bulk operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResultStatus {
    Updated,
    Skipped,
    Failed,
}

impl ResultStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ResultStatus::Updated => "updated",
            ResultStatus::Skipped => "skipped",
            ResultStatus::Failed => "failed",
        }
    }
}

/// Single source of truth for runtime state.
///
/// Holds the configured locations, the currently running bulk operation with
/// its progress and per-mod results, and the last Status Keeper outcome.
///
/// # Thread Safety
///
/// `AppState` is wrapped in `Arc<RwLock<AppState>>` by [`crate::state::StateManager`].
/// Never mutate it directly; use
/// [`update()`](crate::state::StateManager::update) so change events are emitted.
#[derive(Clone, Debug, Default)]
pub struct AppState {
    // Configuration paths
    pub mod_library_dir: Option<Utf8PathBuf>,
    pub game_mods_dir: Option<Utf8PathBuf>,
    pub d3dx_user_ini: Option<Utf8PathBuf>,

    // Runtime state
    pub current_operation: Option<Operation>,
    pub current_mod: Option<String>,

    // Progress state
    pub progress: usize,
    pub total: usize,

    // Results
    pub updated_mods: HashSet<String>,
    pub failed_mods: HashSet<String>,
    pub skipped_mods: HashSet<String>,

    // Library
    pub active_mods: usize,

    // Status Keeper
    pub sync_runs: u64,
    pub last_sync_files_updated: usize,
}

impl AppState {
    /// Library and game mods directory are both known.
    pub fn is_fully_configured(&self) -> bool {
        self.mod_library_dir.is_some() && self.game_mods_dir.is_some()
    }

    pub fn is_busy(&self) -> bool {
        self.current_operation.is_some()
    }

    /// Returns a tuple of (updated, failed, skipped, total).
    pub fn operation_stats(&self) -> (usize, usize, usize, usize) {
        (
            self.updated_mods.len(),
            self.failed_mods.len(),
            self.skipped_mods.len(),
            self.total,
        )
    }

    /// Reset all operation-related state to initial values.
    pub fn reset_operation_state(&mut self) {
        self.current_operation = None;
        self.current_mod = None;
        self.progress = 0;
        self.total = 0;
        self.updated_mods.clear();
        self.failed_mods.clear();
        self.skipped_mods.clear();
    }

    pub fn add_result(&mut self, name: String, status: ResultStatus) {
        match status {
            ResultStatus::Updated => {
                self.updated_mods.insert(name);
            }
            ResultStatus::Failed => {
                self.failed_mods.insert(name);
            }
            ResultStatus::Skipped => {
                self.skipped_mods.insert(name);
            }
        }
        self.progress += 1;
    }

    /// One-line summary of the running or last operation.
    pub fn results_summary(&self) -> String {
        let (updated, failed, skipped, total) = self.operation_stats();
        format!("{updated} updated, {skipped} skipped, {failed} failed ({total} total)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state() {
        let state = AppState::default();
        assert!(!state.is_fully_configured());
        assert!(!state.is_busy());
        assert_eq!(state.active_mods, 0);
    }

    #[test]
    fn test_is_fully_configured() {
        let mut state = AppState::default();
        state.mod_library_dir = Some(Utf8PathBuf::from("ModLibrary"));
        assert!(!state.is_fully_configured());

        state.game_mods_dir = Some(Utf8PathBuf::from("XXMI/Mods"));
        assert!(state.is_fully_configured());
    }

    #[test]
    fn test_add_result() {
        let mut state = AppState::default();
        state.add_result("HeroOutfit".to_string(), ResultStatus::Updated);
        state.add_result("HeroHair".to_string(), ResultStatus::Failed);
        state.add_result("Weapon".to_string(), ResultStatus::Skipped);

        assert_eq!(state.updated_mods.len(), 1);
        assert_eq!(state.failed_mods.len(), 1);
        assert_eq!(state.skipped_mods.len(), 1);
        assert_eq!(state.progress, 3);
    }

    #[test]
    fn test_reset_operation_state() {
        let mut state = AppState::default();
        state.current_operation = Some(Operation::AuthorUpdate);
        state.current_mod = Some("HeroOutfit".to_string());
        state.progress = 5;
        state.total = 10;
        state.updated_mods.insert("HeroOutfit".to_string());

        state.reset_operation_state();

        assert!(!state.is_busy());
        assert!(state.current_mod.is_none());
        assert_eq!(state.progress, 0);
        assert_eq!(state.total, 0);
        assert!(state.updated_mods.is_empty());
    }

    #[test]
    fn test_results_summary() {
        let mut state = AppState::default();
        state.total = 3;
        state.add_result("a".to_string(), ResultStatus::Updated);
        state.add_result("b".to_string(), ResultStatus::Skipped);

        assert_eq!(state.results_summary(), "1 updated, 1 skipped, 0 failed (3 total)");
    }
}
