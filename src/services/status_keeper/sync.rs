use super::constants::update_file;
use super::is_lod_file;
use super::lod::sync_lod_files;
use super::resolve::resolve_target;
use super::source::{build_namespace_map, read_source};
use crate::services::library::ModLibrary;
use crate::services::metadata::MetadataCache;
use anyhow::Result;
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use std::fmt;

/// Steps of a sync cycle, logged as they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    ParseSource,
    ResolveTargets,
    RewriteMainFiles,
    RewriteLodFiles,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncPhase::Idle => "idle",
            SyncPhase::ParseSource => "parse source",
            SyncPhase::ResolveTargets => "resolve targets",
            SyncPhase::RewriteMainFiles => "rewrite main files",
            SyncPhase::RewriteLodFiles => "rewrite LOD files",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Variables read from `d3dx_user.ini`
    pub variables: usize,
    /// Targets that resolved to a file in the library
    pub targets: usize,
    pub unresolved: Vec<String>,
    pub main_files_updated: Vec<Utf8PathBuf>,
    pub lod_files_updated: usize,
    pub values_changed: usize,
    pub failed: Vec<Utf8PathBuf>,
}

impl SyncReport {
    pub fn files_updated(&self) -> usize {
        self.main_files_updated.len() + self.lod_files_updated
    }
}

/// Run one sync cycle: push every persisted variable from `d3dx_user.ini`
/// into the `[Constants]` of its target INI, then mirror modified files into
/// their LOD siblings.
///
/// Only files whose values actually change are written, so running twice in
/// a row leaves the second run with nothing to do.
pub fn run_sync(
    library: &ModLibrary,
    d3dx_user_ini: &Utf8Path,
    cache: &MetadataCache,
) -> Result<SyncReport> {
    let mut report = SyncReport::default();

    log_phase(SyncPhase::ParseSource);
    let namespaces = build_namespace_map(library, cache);
    let variables = read_source(d3dx_user_ini, &namespaces)?;
    report.variables = variables.values().map(IndexMap::len).sum();

    log_phase(SyncPhase::ResolveTargets);
    let mut targets: IndexMap<Utf8PathBuf, IndexMap<String, String>> = IndexMap::new();
    for (logical, vars) in variables {
        let Some(path) = resolve_target(library.root(), &logical) else {
            tracing::debug!("Unresolved Status Keeper target: {}", logical);
            report.unresolved.push(logical);
            continue;
        };
        let merged = targets.entry(path).or_default();
        for (var, value) in vars {
            merged.insert(var.to_ascii_lowercase(), value);
        }
    }
    report.targets = targets.len();

    log_phase(SyncPhase::RewriteMainFiles);
    for (path, vars) in &targets {
        if is_lod_file(path) {
            tracing::debug!("Skipping LOD target {}; it is mirrored from its main file", path);
            continue;
        }
        match update_file(path, vars) {
            Ok(0) => {}
            Ok(changed) => {
                report.values_changed += changed;
                report.main_files_updated.push(path.clone());
            }
            Err(e) => {
                tracing::warn!("Status Keeper failed on {}: {:#}", path, e);
                report.failed.push(path.clone());
            }
        }
    }

    log_phase(SyncPhase::RewriteLodFiles);
    for path in &report.main_files_updated {
        match sync_lod_files(path) {
            Ok(written) => report.lod_files_updated += written,
            Err(e) => {
                tracing::warn!("LOD mirror failed for {}: {:#}", path, e);
            }
        }
    }

    log_phase(SyncPhase::Idle);
    if report.files_updated() > 0 {
        tracing::info!(
            "Status Keeper: {} value(s) in {} file(s), {} LOD file(s) updated",
            report.values_changed,
            report.main_files_updated.len(),
            report.lod_files_updated
        );
    }

    Ok(report)
}

fn log_phase(phase: SyncPhase) {
    tracing::trace!("Status Keeper phase: {}", phase);
}

/// Library root and `d3dx_user.ini` location of a sync target.
#[derive(Debug, Clone)]
pub struct StatusKeeperSync {
    library: ModLibrary,
    d3dx_user_ini: Utf8PathBuf,
}

impl StatusKeeperSync {
    pub fn new(library: ModLibrary, d3dx_user_ini: impl Into<Utf8PathBuf>) -> Self {
        Self {
            library,
            d3dx_user_ini: d3dx_user_ini.into(),
        }
    }

    pub fn d3dx_user_ini(&self) -> &Utf8Path {
        &self.d3dx_user_ini
    }

    pub fn run(&self, cache: &MetadataCache) -> Result<SyncReport> {
        run_sync(&self.library, &self.d3dx_user_ini, cache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::metadata::MOD_JSON;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        library: Utf8PathBuf,
        d3dx: Utf8PathBuf,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
        let library = root.join("ModLibrary");
        fs::create_dir_all(library.join("ModFolder")).unwrap();
        Fixture {
            _temp: temp,
            library,
            d3dx: root.join("d3dx_user.ini"),
        }
    }

    #[test]
    fn test_missing_source_is_noop() {
        let fx = fixture();
        let sync = StatusKeeperSync::new(ModLibrary::new(&fx.library), &fx.d3dx);
        let report = sync.run(&MetadataCache::new()).unwrap();
        assert_eq!(report, SyncReport::default());
    }

    #[test]
    fn test_namespace_target_and_lod_mirror() {
        let fx = fixture();
        let mod_dir = fx.library.join("ModFolder");
        fs::write(
            mod_dir.join(MOD_JSON),
            r#"{"syncMethod":"namespace","namespaces":[{"namespace":"Hero\\Outfit","iniFiles":["Hero.ini"]}]}"#,
        )
        .unwrap();
        fs::write(mod_dir.join("Hero.ini"), "[Constants]\nglobal persist $swap = 0\n").unwrap();
        fs::write(mod_dir.join("Hero_lod.ini"), "[Constants]\nglobal persist $swap = 0\n").unwrap();
        fs::write(&fx.d3dx, "[Constants]\n$\\Hero\\Outfit\\swap = 4\n").unwrap();

        let sync = StatusKeeperSync::new(ModLibrary::new(&fx.library), &fx.d3dx);
        let cache = MetadataCache::new();
        let report = sync.run(&cache).unwrap();

        assert_eq!(report.main_files_updated, vec![mod_dir.join("Hero.ini")]);
        assert_eq!(report.lod_files_updated, 1);
        assert!(fs::read_to_string(mod_dir.join("Hero_lod.ini")).unwrap().contains("$swap = 4"));

        let again = sync.run(&cache).unwrap();
        assert_eq!(again.files_updated(), 0);
    }

    #[test]
    fn test_unresolved_targets_reported() {
        let fx = fixture();
        fs::write(&fx.d3dx, "$\\Nope\\a.ini\\x = 1\n").unwrap();
        let sync = StatusKeeperSync::new(ModLibrary::new(&fx.library), &fx.d3dx);

        let report = sync.run(&MetadataCache::new()).unwrap();

        assert_eq!(report.unresolved, vec!["Nope\\a.ini"]);
        assert_eq!(report.files_updated(), 0);
    }
}
