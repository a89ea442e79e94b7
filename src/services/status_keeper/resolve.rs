use crate::services::path_safety::validate_dir_name;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// Resolve a logical `<mod>\<path>.ini` against the library root.
///
/// Tries the path as written, then a case-insensitive walk of each segment.
/// A legacy leading `mods\` segment is stripped when the full path does not
/// resolve. Every segment must pass [`validate_dir_name`], so `..`, drive
/// prefixes and reserved device names never resolve.
pub fn resolve_target(library_root: &Utf8Path, logical: &str) -> Option<Utf8PathBuf> {
    let segments: Vec<&str> = logical
        .split(['\\', '/'])
        .map(str::trim)
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect();

    if segments.is_empty() {
        return None;
    }
    if let Some(e) = segments.iter().find_map(|segment| validate_dir_name(segment).err()) {
        tracing::debug!("Rejecting target path '{}': {}", logical, e);
        return None;
    }

    if let Some(found) = resolve_segments(library_root, &segments) {
        return Some(found);
    }

    if segments.len() > 1 && segments[0].eq_ignore_ascii_case("mods") {
        return resolve_segments(library_root, &segments[1..]);
    }

    None
}

fn resolve_segments(root: &Utf8Path, segments: &[&str]) -> Option<Utf8PathBuf> {
    let direct = segments.iter().fold(root.to_path_buf(), |path, segment| path.join(segment));
    if direct.is_file() {
        return Some(direct);
    }

    let mut current = root.to_path_buf();
    for segment in segments {
        current = find_entry_ignore_case(&current, segment)?;
    }
    current.is_file().then_some(current)
}

fn find_entry_ignore_case(dir: &Utf8Path, name: &str) -> Option<Utf8PathBuf> {
    let exact = dir.join(name);
    if exact.exists() {
        return Some(exact);
    }

    fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .find(|entry| entry.eq_ignore_ascii_case(name))
        .map(|entry| dir.join(entry))
}
