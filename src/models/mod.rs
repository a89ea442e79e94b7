//! Data models for the XXMM application.
//!
//! This module contains the core data structures used throughout the application:
//! - [`AppState`]: Runtime state of bulk operations, paths and Status Keeper results
//! - [`AppSettings`]: User settings loaded from `Settings/Settings.yaml`
//! - [`AppPaths`]: Absolute locations derived from the settings
//! - [`ModRecord`]: Metadata of one mod, stored in its `mod.json`

pub mod app_state;
pub mod config;
pub mod mod_record;

pub use app_state::{AppState, Operation, ResultStatus};
pub use config::{AppPaths, AppSettings, StatusKeeperSettings};
pub use mod_record::{DEFAULT_CHARACTER, Hotkey, ModRecord, NamespaceDecl};
