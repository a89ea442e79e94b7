//! Parsing `d3dx_user.ini` into per-target persisted variables.
//!
//! Lines look like `$\<address>\<var> = <value>`. An address ending in `.ini`
//! is a path relative to the mod library (legacy form); anything else is a
//! namespace declared by a mod's `mod.json`.

use crate::services::library::ModLibrary;
use crate::services::metadata::MetadataCache;
use anyhow::{Context, Result};
use camino::Utf8Path;
use indexmap::IndexMap;
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::sync::LazyLock;

static VARIABLE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\$\\(?P<address>.+)\\(?P<var>[^\\\s=]+)\s*=\s*(?P<value>.*?)\s*$")
        .expect("Invalid variable line regex")
});

/// Logical target path (`<mod>\<ini>`, backslash separated) to variables.
pub type PersistedVariables = IndexMap<String, IndexMap<String, String>>;

/// Namespace to the logical INI paths that declare it.
pub type NamespaceMap = HashMap<String, Vec<String>>;

/// How a variable line addresses its target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    Path(String),
    Namespace(String),
}

/// One `$\address\var = value` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableLine {
    pub address: Address,
    pub var: String,
    pub value: String,
}

/// Parse a single line. Comments, headers and other lines yield `None`.
pub fn parse_line(line: &str) -> Option<VariableLine> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with(';') || trimmed.starts_with('#') || trimmed.starts_with('[') {
        return None;
    }

    let caps = VARIABLE_LINE.captures(trimmed)?;
    let raw_address = caps["address"].trim().trim_matches('\\');
    if raw_address.is_empty() {
        return None;
    }

    let address = if raw_address.to_ascii_lowercase().ends_with(".ini") {
        Address::Path(raw_address.replace('/', "\\"))
    } else {
        Address::Namespace(raw_address.to_string())
    };

    Some(VariableLine {
        address,
        var: caps["var"].to_string(),
        value: caps["value"].to_string(),
    })
}

/// Look up a namespace, exact match first, then ignoring ASCII case.
pub fn lookup_namespace<'a>(namespaces: &'a NamespaceMap, namespace: &str) -> Option<&'a [String]> {
    if let Some(paths) = namespaces.get(namespace) {
        return Some(paths);
    }
    namespaces
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(namespace))
        .map(|(_, paths)| paths.as_slice())
}

/// Group every variable line by target. For a repeated (target, variable)
/// pair the later line wins.
pub fn parse_source(text: &str, namespaces: &NamespaceMap) -> PersistedVariables {
    let mut targets = PersistedVariables::new();

    for (index, line) in text.lines().enumerate() {
        let Some(parsed) = parse_line(line) else {
            continue;
        };

        let paths: Vec<String> = match &parsed.address {
            Address::Path(path) => vec![path.clone()],
            Address::Namespace(namespace) => match lookup_namespace(namespaces, namespace) {
                Some(paths) => paths.to_vec(),
                None => {
                    tracing::debug!(
                        "d3dx_user.ini line {}: unknown namespace '{}'",
                        index + 1,
                        namespace
                    );
                    continue;
                }
            },
        };

        for path in paths {
            targets
                .entry(path)
                .or_default()
                .insert(parsed.var.clone(), parsed.value.clone());
        }
    }

    targets
}

/// Read and parse `d3dx_user.ini`. A missing file has no variables.
pub fn read_source(path: &Utf8Path, namespaces: &NamespaceMap) -> Result<PersistedVariables> {
    if !path.exists() {
        tracing::debug!("No d3dx_user.ini at {}", path);
        return Ok(PersistedVariables::new());
    }

    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path))?;
    let text = String::from_utf8_lossy(&bytes);
    Ok(parse_source(&text, namespaces))
}

/// Namespaces declared by mods with `syncMethod: "namespace"`.
pub fn build_namespace_map(library: &ModLibrary, cache: &MetadataCache) -> NamespaceMap {
    let mut map = NamespaceMap::new();

    for record in library.load_records(cache) {
        if !record.uses_namespace_sync() {
            continue;
        }
        for decl in &record.namespaces {
            let namespace = decl.namespace.trim();
            if namespace.is_empty() {
                continue;
            }
            let paths = map.entry(namespace.to_string()).or_default();
            for ini in &decl.ini_files {
                let ini = ini.trim().trim_start_matches(['\\', '/']).replace('/', "\\");
                if !ini.is_empty() {
                    paths.push(format!("{}\\{}", record.name, ini));
                }
            }
        }
    }

    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_path_line() {
        let line = parse_line(r"$\ModFolder\KeySwaps.ini\toggle = 1").unwrap();
        assert_eq!(line.address, Address::Path(r"ModFolder\KeySwaps.ini".to_string()));
        assert_eq!(line.var, "toggle");
        assert_eq!(line.value, "1");
    }

    #[test]
    fn test_parse_namespace_line() {
        let line = parse_line(r"  $\Hero\Outfit\swapvar=2  ").unwrap();
        assert_eq!(line.address, Address::Namespace(r"Hero\Outfit".to_string()));
        assert_eq!(line.var, "swapvar");
        assert_eq!(line.value, "2");
    }

    #[test]
    fn test_skips_comments_and_headers() {
        assert!(parse_line("; $\\Mod\\a.ini\\x = 1").is_none());
        assert!(parse_line("# note").is_none());
        assert!(parse_line("[Constants]").is_none());
        assert!(parse_line("").is_none());
        assert!(parse_line("x = 1").is_none());
    }

    #[test]
    fn test_parse_source_later_line_wins() {
        let text = "$\\Mod\\a.ini\\x = 1\n$\\Mod\\a.ini\\x = 2\n$\\Mod\\a.ini\\y = 3\n";
        let parsed = parse_source(text, &NamespaceMap::new());
        let vars = &parsed[r"Mod\a.ini"];
        assert_eq!(vars["x"], "2");
        assert_eq!(vars["y"], "3");
    }

    #[test]
    fn test_namespace_lookup_falls_back_to_case_insensitive() {
        let mut namespaces = NamespaceMap::new();
        namespaces.insert("Hero\\Outfit".to_string(), vec!["HeroMod\\hero.ini".to_string()]);

        let parsed = parse_source("$\\hero\\outfit\\swap = 1\n$\\Unknown\\x = 2\n", &namespaces);

        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed["HeroMod\\hero.ini"]["swap"], "1");
    }

    proptest! {
        #[test]
        fn prop_path_lines_round_trip(
            folder in "[A-Za-z][A-Za-z0-9_]{0,12}",
            file in "[A-Za-z][A-Za-z0-9_]{0,8}",
            var in "[a-z][a-z0-9_]{0,10}",
            value in "[0-9]{1,4}",
        ) {
            let line = format!("$\\{folder}\\{file}.ini\\{var} = {value}");
            let parsed = parse_line(&line).unwrap();
            prop_assert_eq!(parsed.address, Address::Path(format!("{}\\{}.ini", folder, file)));
            prop_assert_eq!(parsed.var, var);
            prop_assert_eq!(parsed.value, value);
        }
    }
}
