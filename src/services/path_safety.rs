//! Validation of mod directory names before they touch the filesystem.
//!
//! Mod names come from directory listings, `ActiveMods.json`, presets and the
//! command line. Every one of them is checked here before it is joined onto
//! the library or game mods directory.

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*', '/', '\\'];

const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathSafetyError {
    #[error("mod name is empty")]
    Empty,

    #[error("mod name '{0}' escapes its directory")]
    Traversal(String),

    #[error("mod name '{0}' is an absolute path")]
    Absolute(String),

    #[error("mod name '{0}' contains invalid character {1:?}")]
    InvalidCharacter(String, char),

    #[error("mod name '{0}' is a reserved device name")]
    Reserved(String),

    #[error("mod name '{0}' ends with a dot or space")]
    TrailingDotOrSpace(String),
}

/// Check that `name` is a single, portable directory name.
pub fn validate_dir_name(name: &str) -> Result<(), PathSafetyError> {
    if name.is_empty() {
        return Err(PathSafetyError::Empty);
    }

    if name == "." || name == ".." || name.contains("..\\") || name.contains("../") {
        return Err(PathSafetyError::Traversal(name.to_string()));
    }

    if name.starts_with('/') || name.starts_with('\\') || has_drive_prefix(name) {
        return Err(PathSafetyError::Absolute(name.to_string()));
    }

    if let Some(c) = name
        .chars()
        .find(|c| INVALID_CHARS.contains(c) || c.is_control())
    {
        return Err(PathSafetyError::InvalidCharacter(name.to_string(), c));
    }

    if name.ends_with('.') || name.ends_with(' ') {
        return Err(PathSafetyError::TrailingDotOrSpace(name.to_string()));
    }

    let stem = name.split('.').next().unwrap_or(name).trim_end();
    if RESERVED_NAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(stem))
    {
        return Err(PathSafetyError::Reserved(name.to_string()));
    }

    Ok(())
}

pub fn is_safe_dir_name(name: &str) -> bool {
    validate_dir_name(name).is_ok()
}

/// Join a validated directory name onto `root`.
pub fn safe_join(root: &Utf8Path, name: &str) -> Result<Utf8PathBuf, PathSafetyError> {
    validate_dir_name(name)?;
    Ok(root.join(name))
}

fn has_drive_prefix(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_accepts_ordinary_names() {
        for name in ["HeroOutfit", "Hero Outfit v2", "[Mod] Hat.v1.2", "ÜberMod", ".hidden"] {
            assert!(is_safe_dir_name(name), "{name} should be accepted");
        }
    }

    #[test]
    fn test_rejects_traversal_and_absolute() {
        assert_eq!(validate_dir_name(".."), Err(PathSafetyError::Traversal("..".into())));
        assert!(matches!(validate_dir_name("../x"), Err(PathSafetyError::Traversal(_))));
        assert!(matches!(validate_dir_name("/etc"), Err(PathSafetyError::Absolute(_))));
        assert!(matches!(validate_dir_name("\\srv"), Err(PathSafetyError::Absolute(_))));
        assert!(matches!(validate_dir_name("C:Mods"), Err(PathSafetyError::Absolute(_))));
        assert!(matches!(validate_dir_name("a/b"), Err(PathSafetyError::InvalidCharacter(_, '/'))));
    }

    #[test]
    fn test_rejects_windows_specific_names() {
        assert!(matches!(validate_dir_name("con"), Err(PathSafetyError::Reserved(_))));
        assert!(matches!(validate_dir_name("LPT1.txt"), Err(PathSafetyError::Reserved(_))));
        assert!(matches!(validate_dir_name("mod."), Err(PathSafetyError::TrailingDotOrSpace(_))));
        assert!(matches!(validate_dir_name("mod "), Err(PathSafetyError::TrailingDotOrSpace(_))));
        assert!(matches!(validate_dir_name("a\u{7}b"), Err(PathSafetyError::InvalidCharacter(_, _))));
        assert!(is_safe_dir_name("CONSOLE"));
    }

    #[test]
    fn test_safe_join() {
        let root = Utf8Path::new("/library");
        assert_eq!(safe_join(root, "Foo").unwrap(), Utf8PathBuf::from("/library/Foo"));
        assert!(safe_join(root, "..").is_err());
    }

    proptest! {
        #[test]
        fn prop_accepted_names_stay_one_component(name in "\\PC{1,40}") {
            if is_safe_dir_name(&name) {
                let root = Utf8Path::new("root");
                let joined = safe_join(root, &name).unwrap();
                prop_assert_eq!(joined.parent(), Some(root));
                prop_assert_eq!(joined.file_name(), Some(name.as_str()));
            }
        }

        #[test]
        fn prop_separators_always_rejected(a in "[a-z]{1,8}", b in "[a-z]{1,8}", sep in "[/\\\\]") {
            let name = format!("{a}{sep}{b}");
            prop_assert!(!is_safe_dir_name(&name));
        }
    }
}
