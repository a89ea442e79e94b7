//! `mod.json` reading and writing, plus the mtime-validated metadata cache.

use crate::models::ModRecord;
use crate::services::fs_util::{modified_time, write_atomic};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;

/// Metadata sidecar inside every mod directory.
pub const MOD_JSON: &str = "mod.json";

/// Preview image names, in lookup order.
pub const PREVIEW_CANDIDATES: &[&str] = &["preview.jpg", "preview.png", "preview.jpeg", "minitile.jpg"];

/// Parse the contents of a `mod.json`.
///
/// Returns `None` for invalid JSON or a document that is not an object.
pub fn parse_mod_json(raw: &str) -> Option<ModRecord> {
    let document = parse_document(raw)?;

    match serde_json::from_value::<ModRecord>(Value::Object(document)) {
        Ok(mut record) => {
            record.normalize();
            Some(record)
        }
        Err(e) => {
            tracing::debug!("Unexpected mod.json shape: {}", e);
            None
        }
    }
}

/// Raw top-level object of a `mod.json`, BOM tolerated.
fn parse_document(raw: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str(raw.trim_start_matches('\u{feff}')) {
        Ok(Value::Object(map)) => Some(map),
        Ok(_) => {
            tracing::debug!("mod.json is not a JSON object");
            None
        }
        Err(e) => {
            tracing::debug!("Invalid mod.json: {}", e);
            None
        }
    }
}

/// Read the record of a mod directory.
///
/// Best effort: a missing or malformed `mod.json` yields a default record
/// named after the directory.
pub fn read_mod_record(mod_dir: &Utf8Path) -> ModRecord {
    let name = mod_dir.file_name().unwrap_or_default().to_string();
    let path = mod_dir.join(MOD_JSON);

    let mut record = match fs::read_to_string(&path) {
        Ok(raw) => parse_mod_json(&raw).unwrap_or_else(|| {
            tracing::warn!("Malformed {}, using defaults", path);
            ModRecord::default()
        }),
        Err(_) => ModRecord::default(),
    };

    record.name = name;
    record.preview = find_preview(mod_dir);
    record
}

/// Write a record into `mod_dir/mod.json`.
///
/// When a valid `mod.json` already exists, only the keys whose typed value
/// differs from what that file reads as are replaced. Everything else keeps
/// its original JSON form, key order included.
pub fn write_mod_record(mod_dir: &Utf8Path, record: &ModRecord) -> Result<()> {
    let path = mod_dir.join(MOD_JSON);
    let updated = record_fields(record)?;

    let document = match fs::read_to_string(&path).ok().and_then(|raw| parse_document(&raw)) {
        Some(original) => patch_document(original, &updated)?,
        None => updated,
    };

    let mut json = serde_json::to_string_pretty(&Value::Object(document))
        .with_context(|| format!("Failed to serialize metadata for {}", record.name))?;
    json.push('\n');
    write_atomic(&path, json.as_bytes())
}

fn record_fields(record: &ModRecord) -> Result<Map<String, Value>> {
    match serde_json::to_value(record)
        .with_context(|| format!("Failed to serialize metadata for {}", record.name))?
    {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!("Metadata for {} serialized to {}", record.name, other),
    }
}

fn patch_document(
    mut original: Map<String, Value>,
    updated: &Map<String, Value>,
) -> Result<Map<String, Value>> {
    let mut baseline: ModRecord =
        serde_json::from_value(Value::Object(original.clone())).unwrap_or_default();
    baseline.normalize();
    let before = record_fields(&baseline)?;

    for (key, value) in updated {
        if before.get(key) != Some(value) {
            original.insert(key.clone(), value.clone());
        }
    }
    for key in before.keys() {
        if !updated.contains_key(key) {
            original.remove(key);
        }
    }
    Ok(original)
}

/// First preview image present in `mod_dir`.
pub fn find_preview(mod_dir: &Utf8Path) -> Option<Utf8PathBuf> {
    PREVIEW_CANDIDATES
        .iter()
        .map(|name| mod_dir.join(name))
        .find(|path| path.is_file())
}

#[derive(Debug, Clone)]
struct CacheEntry {
    record: ModRecord,
    modified: Option<SystemTime>,
}

/// Cache of mod records keyed by mod directory.
///
/// An entry is reused while its recorded `mod.json` mtime is equal to or newer
/// than the one on disk. One coarse mutex guards the map; the file itself is
/// read outside the lock, so two first loads of the same directory may both
/// read and the last one stored wins.
#[derive(Debug, Default)]
pub struct MetadataCache {
    entries: Mutex<HashMap<Utf8PathBuf, CacheEntry>>,
    reads: AtomicU64,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record for `mod_dir`, read from disk only when the cache is stale.
    pub fn get(&self, mod_dir: &Utf8Path) -> ModRecord {
        let on_disk = modified_time(&mod_dir.join(MOD_JSON));

        {
            let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(entry) = entries.get(mod_dir) {
                let fresh = match (entry.modified, on_disk) {
                    (Some(cached), Some(disk)) => cached >= disk,
                    (None, None) => true,
                    _ => false,
                };
                if fresh {
                    return entry.record.clone();
                }
            }
        }

        self.reads.fetch_add(1, Ordering::Relaxed);
        let record = read_mod_record(mod_dir);

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            mod_dir.to_path_buf(),
            CacheEntry {
                record: record.clone(),
                modified: on_disk,
            },
        );
        record
    }

    /// Write `record` to `mod_dir/mod.json` and refresh the cached entry.
    pub fn store(&self, mod_dir: &Utf8Path, record: &ModRecord) -> Result<()> {
        write_mod_record(mod_dir, record)?;

        let modified = modified_time(&mod_dir.join(MOD_JSON));
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            mod_dir.to_path_buf(),
            CacheEntry {
                record: record.clone(),
                modified,
            },
        );
        Ok(())
    }

    pub fn invalidate(&self, mod_dir: &Utf8Path) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(mod_dir);
    }

    pub fn clear(&self) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of times a `mod.json` was actually read from disk.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }
}
