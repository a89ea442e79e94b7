//! Mirroring a main INI's `[Constants]` into its `_lod` siblings.

use super::constants::{
    ConstantEntry, extract_constants, is_constants_header, rewrite_constants, section_name,
    split_line_ending,
};
use super::{is_ini_file, is_lod_file};
use crate::services::fs_util::{utf8_path, write_atomic};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::fs;

/// `*_lod*.ini` files in the same directory as `main`.
pub fn lod_siblings(main: &Utf8Path) -> Vec<Utf8PathBuf> {
    let Some(dir) = main.parent() else {
        return Vec::new();
    };
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut siblings: Vec<Utf8PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| utf8_path(entry.path()))
        .filter(|path| path.as_path() != main)
        .filter(|path| path.is_file() && is_ini_file(path) && is_lod_file(path))
        .collect();
    siblings.sort();
    siblings
}

/// Bring `text`'s `[Constants]` in line with `constants`: update differing
/// values, append missing declarations at the end of the section, and add
/// the section at the end of the file when it does not exist.
///
/// Returns the new text and the number of lines changed or added.
pub fn mirror_constants(text: &str, constants: &[ConstantEntry]) -> (String, usize) {
    let values: IndexMap<String, String> = constants
        .iter()
        .map(|entry| (entry.name.clone(), entry.value.clone()))
        .collect();
    let (updated, mut changed) = rewrite_constants(text, &values);

    let present: HashSet<String> = extract_constants(&updated)
        .into_iter()
        .map(|entry| entry.name.to_ascii_lowercase())
        .collect();
    let missing: Vec<&ConstantEntry> = constants
        .iter()
        .filter(|entry| !present.contains(&entry.name.to_ascii_lowercase()))
        .collect();

    if missing.is_empty() {
        return (updated, changed);
    }
    changed += missing.len();

    let newline = if updated.contains("\r\n") { "\r\n" } else { "\n" };
    let additions: String = missing
        .iter()
        .map(|entry| format!("{}{}", entry.line, newline))
        .collect();

    let lines: Vec<&str> = updated.split_inclusive('\n').collect();
    let Some(header) = lines.iter().position(|line| is_constants_header(line)) else {
        let mut output = updated;
        if !output.is_empty() && !output.ends_with('\n') {
            output.push_str(newline);
        }
        output.push_str(&format!("[Constants]{newline}"));
        output.push_str(&additions);
        return (output, changed);
    };

    // Insert after the last non-blank line of the section
    let section_end = lines[header + 1..]
        .iter()
        .position(|line| section_name(line).is_some())
        .map_or(lines.len(), |offset| header + 1 + offset);
    let insert_at = (header + 1..section_end)
        .rev()
        .find(|&i| !lines[i].trim().is_empty())
        .map_or(header + 1, |i| i + 1);

    let mut output = String::with_capacity(updated.len() + additions.len());
    for (i, line) in lines.iter().enumerate() {
        if i == insert_at {
            output.push_str(&additions);
        }
        if i + 1 == insert_at && split_line_ending(line).1.is_empty() {
            output.push_str(line);
            output.push_str(newline);
            continue;
        }
        output.push_str(line);
    }
    if insert_at >= lines.len() {
        output.push_str(&additions);
    }

    (output, changed)
}

/// Mirror `main`'s constants into each LOD sibling. Returns the number of
/// sibling files written.
pub fn sync_lod_files(main: &Utf8Path) -> Result<usize> {
    let text = fs::read_to_string(main).with_context(|| format!("Failed to read {}", main))?;
    let constants = extract_constants(&text);
    if constants.is_empty() {
        return Ok(0);
    }

    let mut written = 0;
    for sibling in lod_siblings(main) {
        let lod_text = match fs::read_to_string(&sibling) {
            Ok(lod_text) => lod_text,
            Err(e) => {
                tracing::warn!("Failed to read LOD file {}: {}", sibling, e);
                continue;
            }
        };

        let (mirrored, changed) = mirror_constants(&lod_text, &constants);
        if changed > 0 {
            write_atomic(&sibling, mirrored.as_bytes())?;
            tracing::debug!("Mirrored {} constant(s) into {}", changed, sibling);
            written += 1;
        }
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(name: &str, value: &str) -> ConstantEntry {
        ConstantEntry {
            name: name.to_string(),
            value: value.to_string(),
            line: format!("global persist ${name} = {value}"),
        }
    }

    #[test]
    fn test_updates_and_appends_inside_section() {
        let text = "[Constants]\nglobal persist $a = 0\n\n[Present]\nrun = x\n";
        let (out, changed) = mirror_constants(text, &[entry("a", "1"), entry("b", "2")]);

        assert_eq!(changed, 2);
        assert_eq!(
            out,
            "[Constants]\nglobal persist $a = 1\nglobal persist $b = 2\n\n[Present]\nrun = x\n"
        );
    }

    #[test]
    fn test_creates_section_when_missing() {
        let text = "[Present]\r\nrun = x";
        let (out, changed) = mirror_constants(text, &[entry("a", "1")]);

        assert_eq!(changed, 1);
        assert_eq!(out, "[Present]\r\nrun = x\r\n[Constants]\r\nglobal persist $a = 1\r\n");
    }

    #[test]
    fn test_in_sync_is_untouched() {
        let text = "[Constants]\nglobal persist $a = 1\n";
        let (out, changed) = mirror_constants(text, &[entry("a", "1")]);
        assert_eq!(changed, 0);
        assert_eq!(out, text);
    }

    #[test]
    fn test_sync_lod_files() {
        let temp = TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
        let main = dir.join("Hero.ini");
        fs::write(&main, "[Constants]\nglobal persist $swap = 3\n").unwrap();
        fs::write(dir.join("Hero_LOD.ini"), "[Constants]\nglobal persist $swap = 0\n").unwrap();
        fs::write(dir.join("Other_lod.ini"), "[Constants]\nglobal persist $swap = 0\n").unwrap();
        fs::write(dir.join("Notes.txt"), "$swap = 0\n").unwrap();

        assert_eq!(
            lod_siblings(&main),
            vec![dir.join("Hero_LOD.ini"), dir.join("Other_lod.ini")]
        );
        assert_eq!(sync_lod_files(&main).unwrap(), 2);
        for lod in ["Hero_LOD.ini", "Other_lod.ini"] {
            assert_eq!(
                fs::read_to_string(dir.join(lod)).unwrap(),
                "[Constants]\nglobal persist $swap = 3\n"
            );
        }
        assert_eq!(fs::read_to_string(dir.join("Notes.txt")).unwrap(), "$swap = 0\n");
        assert_eq!(sync_lod_files(&main).unwrap(), 0);
    }
}
