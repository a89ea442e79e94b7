// State management module
//
// This module provides the StateManager which wraps AppState with thread-safe access
// using Arc<RwLock<T>> and emits change events to whoever renders progress
// (the CLI today, any front end tomorrow).

use crate::models::{AppState, Operation, ResultStatus};
use camino::Utf8PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Change events emitted when state is modified
///
/// Background work never touches presentation directly; it updates the state
/// and consumers react to these events.
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// Library, game mods directory or d3dx_user.ini location changed
    ConfigurationChanged {
        is_fully_configured: bool,
    },

    /// A bulk operation has started
    OperationStarted {
        operation: Operation,
        total: usize,
    },

    /// Progress has been updated during a bulk operation
    ProgressUpdated {
        current: usize,
        total: usize,
        current_mod: Option<String>,
    },

    /// A bulk operation has finished or was cancelled
    OperationFinished {
        operation: Operation,
        updated: usize,
        failed: usize,
        skipped: usize,
    },

    /// A mod has been processed by the running operation
    ModProcessed {
        name: String,
        status: ResultStatus,
        message: String,
    },

    /// A mod has been activated or deactivated
    ModToggled {
        name: String,
        active: bool,
    },

    /// Number of active mods changed
    ActiveModsChanged {
        count: usize,
    },

    /// A Status Keeper sync cycle completed
    StatusKeeperSynced {
        files_updated: usize,
    },

    /// State has been reset
    StateReset,
}

/// Thread-safe state manager with event emission
///
/// - Provides thread-safe access to [`AppState`] via `Arc<RwLock<T>>`
/// - Detects state changes and emits [`StateChange`] events
/// - Supports subscribing to state changes via tokio broadcast channels
///
/// Always use `StateManager` instead of accessing [`AppState`] directly:
/// - [`read()`](Self::read) for reading state
/// - [`update()`](Self::update) for mutations with automatic event emission
/// - [`subscribe()`](Self::subscribe) for listening to state changes
pub struct StateManager {
    /// The application state protected by RwLock for thread-safe access
    state: Arc<RwLock<AppState>>,

    /// Broadcast channel for emitting state change events
    state_tx: broadcast::Sender<StateChange>,
}

impl StateManager {
    /// Create a new StateManager with default state and a buffer of 100 events
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(AppState::default())),
            state_tx,
        }
    }

    /// Get a cloned snapshot of the current state
    pub fn snapshot(&self) -> AppState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Execute a function with read access to the state
    ///
    /// # Example
    /// ```ignore
    /// let busy = state_manager.read(|state| state.is_busy());
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&AppState) -> R,
    {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Update the state and emit change events
    ///
    /// Captures the old state, applies the update, diffs the two and sends
    /// one event per detected change.
    ///
    /// # Returns
    /// The StateChange events that were emitted
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut AppState),
    {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let old_state = state.clone();

        update_fn(&mut state);

        let changes = Self::detect_changes(&old_state, &state);

        for change in &changes {
            // Nobody listening is fine
            let _ = self.state_tx.send(change.clone());
        }

        changes
    }

    /// Subscribe to state change events
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    fn emit(&self, change: StateChange) -> StateChange {
        let _ = self.state_tx.send(change.clone());
        change
    }

    /// Detect what changed between two states and generate events
    fn detect_changes(old: &AppState, new: &AppState) -> Vec<StateChange> {
        let mut changes = Vec::new();

        if old.mod_library_dir != new.mod_library_dir
            || old.game_mods_dir != new.game_mods_dir
            || old.d3dx_user_ini != new.d3dx_user_ini
        {
            changes.push(StateChange::ConfigurationChanged {
                is_fully_configured: new.is_fully_configured(),
            });
        }

        if old.current_operation != new.current_operation {
            if let Some(operation) = new.current_operation {
                changes.push(StateChange::OperationStarted {
                    operation,
                    total: new.total,
                });
            } else if let Some(operation) = old.current_operation {
                changes.push(StateChange::OperationFinished {
                    operation,
                    updated: new.updated_mods.len(),
                    failed: new.failed_mods.len(),
                    skipped: new.skipped_mods.len(),
                });
            }
        }

        if old.progress != new.progress
            || old.total != new.total
            || old.current_mod != new.current_mod
        {
            changes.push(StateChange::ProgressUpdated {
                current: new.progress,
                total: new.total,
                current_mod: new.current_mod.clone(),
            });
        }

        if old.active_mods != new.active_mods {
            changes.push(StateChange::ActiveModsChanged {
                count: new.active_mods,
            });
        }

        if old.sync_runs != new.sync_runs {
            changes.push(StateChange::StatusKeeperSynced {
                files_updated: new.last_sync_files_updated,
            });
        }

        changes
    }

    // Convenience methods for common state updates

    /// Record the resolved library, game mods and d3dx_user.ini locations
    pub fn set_paths(
        &self,
        mod_library_dir: Utf8PathBuf,
        game_mods_dir: Utf8PathBuf,
        d3dx_user_ini: Utf8PathBuf,
    ) -> Vec<StateChange> {
        self.update(|state| {
            state.mod_library_dir = Some(mod_library_dir);
            state.game_mods_dir = Some(game_mods_dir);
            state.d3dx_user_ini = Some(d3dx_user_ini);
        })
    }

    pub fn set_game_mods_dir(&self, game_mods_dir: Utf8PathBuf) -> Vec<StateChange> {
        self.update(|state| state.game_mods_dir = Some(game_mods_dir))
    }

    /// Start a bulk operation over `total` mods
    pub fn start_operation(&self, operation: Operation, total: usize) -> Vec<StateChange> {
        self.update(|state| {
            state.reset_operation_state();
            state.current_operation = Some(operation);
            state.total = total;
        })
    }

    /// Finish (or cancel) the running operation, keeping its results
    pub fn finish_operation(&self) -> Vec<StateChange> {
        self.update(|state| {
            state.current_operation = None;
            state.current_mod = None;
        })
    }

    /// Mark the mod currently being processed
    pub fn update_progress(&self, name: impl Into<String>) -> Vec<StateChange> {
        let name = name.into();
        self.update(|state| state.current_mod = Some(name))
    }

    /// Record the result of processing a mod
    pub fn add_mod_result(
        &self,
        name: impl Into<String>,
        status: ResultStatus,
        message: impl Into<String>,
    ) -> Vec<StateChange> {
        let name = name.into();
        let mut changes = self.update(|state| state.add_result(name.clone(), status));

        changes.push(self.emit(StateChange::ModProcessed {
            name,
            status,
            message: message.into(),
        }));

        changes
    }

    /// Announce an activation change and the new active mod count
    pub fn mod_toggled(
        &self,
        name: impl Into<String>,
        active: bool,
        active_count: usize,
    ) -> Vec<StateChange> {
        let mut changes = vec![self.emit(StateChange::ModToggled {
            name: name.into(),
            active,
        })];
        changes.extend(self.update(|state| state.active_mods = active_count));
        changes
    }

    pub fn set_active_count(&self, active_count: usize) -> Vec<StateChange> {
        self.update(|state| state.active_mods = active_count)
    }

    /// Record a completed Status Keeper sync cycle
    pub fn status_keeper_synced(&self, files_updated: usize) -> Vec<StateChange> {
        self.update(|state| {
            state.sync_runs += 1;
            state.last_sync_files_updated = files_updated;
        })
    }

    /// Reset all operation-related state
    pub fn reset_operation_state(&self) -> Vec<StateChange> {
        let mut changes = self.update(|state| state.reset_operation_state());
        changes.push(self.emit(StateChange::StateReset));
        changes
    }

    /// Get an Arc reference to the state for use in worker threads
    pub fn state_arc(&self) -> Arc<RwLock<AppState>> {
        Arc::clone(&self.state)
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

// Make StateManager cloneable for sharing across threads
impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
        }
    }
}
