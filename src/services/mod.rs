//! Services module - business logic for managing the mod library.
//!
//! Everything here works on plain paths and explicit inputs and has no
//! knowledge of the CLI, so each piece can be tested against a temporary
//! directory.
//!
//! # Components
//!
//! - [`metadata`]: `mod.json` records and the mtime-validated [`MetadataCache`]
//! - [`registry`]: `ActiveMods.json`, the persisted active flags
//! - [`symlinks`]: directory links from the game mods directory into the library
//! - [`presets`]: named snapshots of the registry
//! - [`status_keeper`]: `d3dx_user.ini` sync into mod INIs and `.msk` backups
//! - [`scraper`] and [`author_update`]: GameBanana author lookup
//! - [`hotkeys`]: hotkey discovery from `[Key*]` INI sections
//! - [`mod_info_backup`]: rotated backups of `mod.json` and preview images
//! - [`functions`]: per-feature enable switches
//!
//! Names coming from outside are always checked by [`path_safety`] before a
//! path is built from them.

pub mod author_update;
pub mod fs_util;
pub mod functions;
pub mod hotkeys;
pub mod library;
pub mod metadata;
pub mod mod_info_backup;
pub mod path_safety;
pub mod presets;
pub mod registry;
pub mod scraper;
pub mod status_keeper;
pub mod symlinks;

pub use author_update::{AuthorUpdateReport, UpdateMode, run_author_update};
pub use functions::{Function, FunctionRegistry};
pub use hotkeys::{HotkeyRefreshReport, find_hotkeys, parse_hotkeys, run_hotkey_refresh};
pub use library::ModLibrary;
pub use metadata::{MOD_JSON, MetadataCache, read_mod_record, write_mod_record};
pub use mod_info_backup::{MAX_BACKUP_SETS, ModInfoBackup, ModInfoReport};
pub use path_safety::{PathSafetyError, is_safe_dir_name, validate_dir_name};
pub use presets::{DEFAULT_PRESET, PresetLoadReport, PresetManager};
pub use registry::ActiveModsRegistry;
pub use scraper::{AuthorExtractor, AuthorScraper, AuthorSource, ScrapeError};
pub use symlinks::{FixReport, LinkOutcome, SymlinkManager};
