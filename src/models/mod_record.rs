use camino::Utf8PathBuf;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Category assigned to mods whose `mod.json` does not name a character.
pub const DEFAULT_CHARACTER: &str = "other";

/// Metadata of a single mod, backed by `<ModLibrary>/<name>/mod.json`.
///
/// The record is identified by its directory name, which is not stored in the
/// JSON file. Keys this struct does not model are collected into `extra`.
/// Writes go through [`crate::services::metadata::write_mod_record`], which
/// patches only the keys whose typed value changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModRecord {
    #[serde(skip)]
    pub name: String,

    #[serde(default = "default_character", deserialize_with = "lenient_string")]
    pub character: String,

    #[serde(default, deserialize_with = "lenient_string")]
    pub author: String,

    #[serde(default, deserialize_with = "lenient_string")]
    pub url: String,

    #[serde(default, deserialize_with = "lenient_string")]
    pub version: String,

    #[serde(default, deserialize_with = "lenient_string")]
    pub date_checked: String,

    #[serde(default, deserialize_with = "lenient_string")]
    pub date_updated: String,

    #[serde(default, deserialize_with = "lenient_hotkeys")]
    pub hotkeys: Vec<Hotkey>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_method: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespaces: Vec<NamespaceDecl>,

    /// Preview image found next to `mod.json`, resolved at load time.
    #[serde(skip)]
    pub preview: Option<Utf8PathBuf>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A hotkey entry shown for a mod.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hotkey {
    pub key: String,
    #[serde(default)]
    pub description: String,
}

/// Status Keeper namespace declaration (`syncMethod: "namespace"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceDecl {
    pub namespace: String,
    #[serde(default)]
    pub ini_files: Vec<String>,
}

impl ModRecord {
    /// Empty record for the given directory name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// True when this mod declares Status Keeper namespaces.
    pub fn uses_namespace_sync(&self) -> bool {
        self.sync_method
            .as_deref()
            .is_some_and(|m| m.eq_ignore_ascii_case("namespace"))
    }

    pub fn has_author(&self) -> bool {
        !self.author.trim().is_empty()
    }

    pub fn has_url(&self) -> bool {
        !self.url.trim().is_empty()
    }

    /// Fill fields that must never be empty after loading.
    pub(crate) fn normalize(&mut self) {
        if self.character.trim().is_empty() {
            self.character = DEFAULT_CHARACTER.to_string();
        }
    }
}

impl Default for ModRecord {
    fn default() -> Self {
        Self {
            name: String::new(),
            character: default_character(),
            author: String::new(),
            url: String::new(),
            version: String::new(),
            date_checked: String::new(),
            date_updated: String::new(),
            hotkeys: Vec::new(),
            sync_method: None,
            namespaces: Vec::new(),
            preview: None,
            extra: Map::new(),
        }
    }
}

impl Hotkey {
    pub fn new(key: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            description: description.into(),
        }
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::String(key) if !key.trim().is_empty() => Some(Self::new(key, "")),
            Value::Object(map) => {
                let key = map.get("key").and_then(Value::as_str)?.to_string();
                let description = map
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Some(Self { key, description })
            }
            _ => None,
        }
    }
}

fn default_character() -> String {
    DEFAULT_CHARACTER.to_string()
}

/// Accept strings, numbers, booleans and null where a string is expected.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    })
}

/// Hotkeys may be `{key, description}` objects or plain strings.
fn lenient_hotkeys<'de, D>(deserializer: D) -> Result<Vec<Hotkey>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items.into_iter().filter_map(Hotkey::from_value).collect(),
        _ => Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_record() {
        let record = ModRecord::default();
        assert_eq!(record.character, "other");
        assert!(record.author.is_empty());
        assert!(record.hotkeys.is_empty());
    }

    #[test]
    fn test_parse_mixed_hotkeys() {
        let raw = r#"{
            "character": "Hero",
            "hotkeys": [{"key": "VK_F1", "description": "Toggle hat"}, "VK_F2", 42]
        }"#;
        let record: ModRecord = serde_json::from_str(raw).unwrap();

        assert_eq!(record.character, "Hero");
        assert_eq!(record.hotkeys.len(), 2);
        assert_eq!(record.hotkeys[0], Hotkey::new("VK_F1", "Toggle hat"));
        assert_eq!(record.hotkeys[1], Hotkey::new("VK_F2", ""));
    }

    #[test]
    fn test_unknown_keys_preserved() {
        let raw = r#"{"author": "Jane", "customFlag": true, "rating": 5}"#;
        let record: ModRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(record.extra.get("customFlag"), Some(&Value::Bool(true)));

        let written = serde_json::to_value(&record).unwrap();
        assert_eq!(written["rating"], Value::from(5));
        assert_eq!(written["author"], Value::from("Jane"));
    }

    #[test]
    fn test_lenient_scalar_fields() {
        let raw = r#"{"version": 2, "author": null, "url": "https://example.com"}"#;
        let record: ModRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(record.version, "2");
        assert!(record.author.is_empty());
        assert!(record.has_url());
    }

    #[test]
    fn test_namespace_declarations() {
        let raw = r#"{
            "syncMethod": "namespace",
            "namespaces": [{"namespace": "Hero\\Outfit", "iniFiles": ["Outfit.ini"]}]
        }"#;
        let record: ModRecord = serde_json::from_str(raw).unwrap();
        assert!(record.uses_namespace_sync());
        assert_eq!(record.namespaces[0].ini_files, vec!["Outfit.ini"]);
    }

    #[test]
    fn test_normalize_empty_character() {
        let mut record: ModRecord = serde_json::from_str(r#"{"character": ""}"#).unwrap();
        record.normalize();
        assert_eq!(record.character, DEFAULT_CHARACTER);
    }
}
