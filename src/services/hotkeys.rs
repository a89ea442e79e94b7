//! Hotkey Finder: collects `[Key*]` sections from a mod's INI files.

use crate::models::{Hotkey, Operation, ResultStatus};
use crate::services::fs_util::utf8_path;
use crate::services::library::ModLibrary;
use crate::services::metadata::MetadataCache;
use crate::services::status_keeper::constants::section_name;
use anyhow::Result;
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::HashSet;
use std::fs;
use tokio::sync::watch;
use walkdir::WalkDir;

const KEY_ENTRIES: &[&str] = &["key", "back"];

/// Hotkeys declared in one INI document, in order, without duplicates.
pub fn parse_hotkeys(text: &str) -> Vec<Hotkey> {
    let mut hotkeys = Vec::new();
    let mut description: Option<String> = None;

    for line in text.lines() {
        if let Some(section) = section_name(line) {
            description = key_section_description(section);
            continue;
        }
        let Some(description) = &description else {
            continue;
        };

        let content = line.split(';').next().unwrap_or_default();
        let Some((name, value)) = content.split_once('=') else {
            continue;
        };
        let name = name.trim();
        let value = value.trim();
        if value.is_empty() || !KEY_ENTRIES.iter().any(|k| k.eq_ignore_ascii_case(name)) {
            continue;
        }

        let hotkey = Hotkey::new(value, description.clone());
        if !hotkeys.contains(&hotkey) {
            hotkeys.push(hotkey);
        }
    }

    hotkeys
}

/// `KeySwapHat` describes itself as `SwapHat`.
fn key_section_description(section: &str) -> Option<String> {
    let prefix = section.get(..3)?;
    if !prefix.eq_ignore_ascii_case("key") {
        return None;
    }
    let rest = section[3..].trim_start_matches(['_', ' ', '-']);
    Some(if rest.is_empty() { section.to_string() } else { rest.to_string() })
}

/// Hotkeys across every enabled `.ini` in `mod_dir`.
pub fn find_hotkeys(mod_dir: &Utf8Path) -> Vec<Hotkey> {
    let mut seen = HashSet::new();
    let mut hotkeys = Vec::new();

    for ini in ini_files(mod_dir) {
        let text = match fs::read(&ini) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                tracing::debug!("Skipping unreadable {}: {}", ini, e);
                continue;
            }
        };
        for hotkey in parse_hotkeys(&text) {
            if seen.insert(hotkey.clone()) {
                hotkeys.push(hotkey);
            }
        }
    }

    hotkeys
}

fn ini_files(mod_dir: &Utf8Path) -> Vec<Utf8PathBuf> {
    WalkDir::new(mod_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| utf8_path(entry.into_path()))
        .filter(|path| {
            path.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("ini"))
        })
        .filter(|path| {
            let relative = path.strip_prefix(mod_dir).unwrap_or(path);
            !relative.as_str().to_ascii_lowercase().contains("disabled")
        })
        .collect()
}

/// Write the mod's hotkeys into `mod.json` when they differ. In smart mode
/// mods that already list hotkeys are left alone.
pub fn refresh_mod_hotkeys(
    cache: &MetadataCache,
    mod_dir: &Utf8Path,
    smart: bool,
) -> Result<ResultStatus> {
    let mut record = cache.get(mod_dir);
    if smart && !record.hotkeys.is_empty() {
        return Ok(ResultStatus::Skipped);
    }

    let found = find_hotkeys(mod_dir);
    if found == record.hotkeys {
        return Ok(ResultStatus::Skipped);
    }

    record.hotkeys = found;
    cache.store(mod_dir, &record)?;
    tracing::debug!("Stored {} hotkeys for {}", record.hotkeys.len(), mod_dir);
    Ok(ResultStatus::Updated)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HotkeyRefreshReport {
    pub updated: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
    pub cancelled: bool,
}

/// Refresh hotkeys for every mod, checking `cancel_rx` between mods.
pub fn run_hotkey_refresh(
    library: &ModLibrary,
    cache: &MetadataCache,
    smart: bool,
    state: &crate::state::StateManager,
    cancel_rx: &watch::Receiver<bool>,
) -> HotkeyRefreshReport {
    let names = library.list_mod_dirs();
    let mut report = HotkeyRefreshReport::default();
    state.start_operation(Operation::HotkeyRefresh, names.len());

    for name in names {
        if *cancel_rx.borrow() {
            report.cancelled = true;
            break;
        }
        state.update_progress(&name);

        match refresh_mod_hotkeys(cache, &library.root().join(&name), smart) {
            Ok(ResultStatus::Updated) => {
                state.add_mod_result(&name, ResultStatus::Updated, "hotkeys updated");
                report.updated.push(name);
            }
            Ok(status) => {
                state.add_mod_result(&name, status, "hotkeys unchanged");
                report.skipped.push(name);
            }
            Err(e) => {
                tracing::warn!("Hotkey refresh failed for {}: {:#}", name, e);
                state.add_mod_result(&name, ResultStatus::Failed, format!("{e:#}"));
                report.failed.push(name);
            }
        }
    }

    state.finish_operation();
    tracing::info!(
        "Hotkey refresh: {} updated, {} skipped, {} failed",
        report.updated.len(),
        report.skipped.len(),
        report.failed.len()
    );
    report
}
