//! Reading and rewriting the `[Constants]` section of a mod INI.

use crate::services::fs_util::write_atomic;
use anyhow::{Context, Result};
use camino::Utf8Path;
use indexmap::IndexMap;
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::sync::LazyLock;

static CONSTANT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<prefix>[^;]*?\$(?P<name>[A-Za-z0-9_.]+)\s*=\s*)(?P<value>[^;]*?)(?P<suffix>\s*(?:;.*)?)$",
    )
    .expect("Invalid constant line regex")
});

pub const CONSTANTS_SECTION: &str = "Constants";

/// A `$name = value` declaration inside `[Constants]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantEntry {
    pub name: String,
    pub value: String,
    /// The declaration as written, without indentation or trailing comment
    pub line: String,
}

/// Section name if `line` is a `[Section]` header.
pub(crate) fn section_name(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    let rest = trimmed.strip_prefix('[')?;
    let end = rest.find(']')?;
    Some(rest[..end].trim())
}

pub(crate) fn is_constants_header(line: &str) -> bool {
    section_name(line).is_some_and(|name| name.eq_ignore_ascii_case(CONSTANTS_SECTION))
}

/// Split a line from `split_inclusive('\n')` into its body and line ending.
pub(crate) fn split_line_ending(line: &str) -> (&str, &str) {
    if let Some(body) = line.strip_suffix("\r\n") {
        (body, "\r\n")
    } else if let Some(body) = line.strip_suffix('\n') {
        (body, "\n")
    } else {
        (line, "")
    }
}

/// Declarations in `[Constants]`, in file order.
pub fn extract_constants(text: &str) -> Vec<ConstantEntry> {
    let mut entries = Vec::new();
    let mut in_constants = false;

    for line in text.lines() {
        if section_name(line).is_some() {
            in_constants = is_constants_header(line);
            continue;
        }
        if !in_constants {
            continue;
        }
        if let Some(caps) = CONSTANT_LINE.captures(line) {
            let declaration = format!("{}{}", caps["prefix"].trim_start(), caps["value"].trim_end());
            entries.push(ConstantEntry {
                name: caps["name"].to_string(),
                value: caps["value"].trim().to_string(),
                line: declaration,
            });
        }
    }

    entries
}

/// Replace the values of `values` (matched ignoring ASCII case) inside
/// `[Constants]`. Everything else, including indentation, trailing comments
/// and line endings, is kept byte for byte.
///
/// Returns the new text and the number of lines whose value changed.
pub fn rewrite_constants(text: &str, values: &IndexMap<String, String>) -> (String, usize) {
    let lookup: HashMap<String, &str> = values
        .iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value.as_str()))
        .collect();

    let mut output = String::with_capacity(text.len());
    let mut changed = 0;
    let mut in_constants = false;

    for line in text.split_inclusive('\n') {
        let (body, ending) = split_line_ending(line);

        if section_name(body).is_some() {
            in_constants = is_constants_header(body);
            output.push_str(line);
            continue;
        }

        let replacement = in_constants
            .then(|| CONSTANT_LINE.captures(body))
            .flatten()
            .and_then(|caps| {
                let new_value = lookup.get(&caps["name"].to_ascii_lowercase())?;
                if caps["value"].trim() == new_value.trim() {
                    return None;
                }
                Some(format!("{}{}{}", &caps["prefix"], new_value, &caps["suffix"]))
            });

        match replacement {
            Some(new_body) => {
                output.push_str(&new_body);
                output.push_str(ending);
                changed += 1;
            }
            None => output.push_str(line),
        }
    }

    (output, changed)
}

/// Rewrite a file's `[Constants]` in place. The file is only written when a
/// value actually changed. Returns the number of changed lines.
pub fn update_file(path: &Utf8Path, values: &IndexMap<String, String>) -> Result<usize> {
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?;
    let (rewritten, changed) = rewrite_constants(&text, values);

    if changed > 0 {
        write_atomic(path, rewritten.as_bytes())?;
        tracing::debug!("Updated {} constant(s) in {}", changed, path);
    }

    Ok(changed)
}
