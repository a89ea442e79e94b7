//! Directory symlinks from the game mods directory into the mod library.
//!
//! A mod is active when `game_mods/<name>` is a directory symlink pointing at
//! `library/<name>`. Only entries that are links are ever removed; a real
//! directory with the same name blocks the link and is left alone.

use crate::services::fs_util::utf8_path;
use crate::services::path_safety::{PathSafetyError, validate_dir_name};
use crate::services::registry::ActiveModsRegistry;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::BTreeSet;
use std::fs;
use std::io;

/// What happened to a single link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    Created,
    AlreadyLinked,
    /// A real file or directory sits where the link should go
    Occupied,
    SourceMissing,
    Removed,
    /// Refused to remove an entry that is not a link
    NotALink,
    Absent,
    Rejected(PathSafetyError),
}

/// Changes made by [`SymlinkManager::validate_and_fix`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixReport {
    pub removed_orphans: Vec<String>,
    pub created: Vec<String>,
    pub blocked: Vec<String>,
    pub missing_sources: Vec<String>,
}

impl FixReport {
    /// Number of filesystem changes made.
    pub fn changes(&self) -> usize {
        self.removed_orphans.len() + self.created.len()
    }
}

#[derive(Debug, Clone)]
pub struct SymlinkManager {
    library_root: Utf8PathBuf,
    game_mods_dir: Utf8PathBuf,
}

impl SymlinkManager {
    pub fn new(library_root: impl Into<Utf8PathBuf>, game_mods_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            library_root: library_root.into(),
            game_mods_dir: game_mods_dir.into(),
        }
    }

    pub fn library_root(&self) -> &Utf8Path {
        &self.library_root
    }

    pub fn game_mods_dir(&self) -> &Utf8Path {
        &self.game_mods_dir
    }

    pub fn link_path(&self, name: &str) -> Result<Utf8PathBuf, PathSafetyError> {
        validate_dir_name(name)?;
        Ok(self.game_mods_dir.join(name))
    }

    pub fn is_linked(&self, name: &str) -> bool {
        self.link_path(name)
            .is_ok_and(|link| is_dir_link(&link))
    }

    /// Create `game_mods/<name>` pointing at `library/<name>`.
    pub fn create_link(&self, name: &str) -> Result<LinkOutcome> {
        if let Err(e) = validate_dir_name(name) {
            tracing::warn!("Refusing to link mod: {}", e);
            return Ok(LinkOutcome::Rejected(e));
        }

        let source = self.library_root.join(name);
        let link = self.game_mods_dir.join(name);

        if is_dir_link(&link) {
            return Ok(LinkOutcome::AlreadyLinked);
        }
        if link.exists() {
            tracing::warn!("Cannot link {}: a real entry already exists at {}", name, link);
            return Ok(LinkOutcome::Occupied);
        }
        if !source.is_dir() {
            tracing::warn!("Cannot link {}: source {} is missing", name, source);
            return Ok(LinkOutcome::SourceMissing);
        }

        fs::create_dir_all(&self.game_mods_dir).with_context(|| {
            format!("Failed to create game mods directory: {}", self.game_mods_dir)
        })?;

        let target = std::path::absolute(&source)
            .with_context(|| format!("Failed to resolve {}", source))?;
        create_dir_link(&target, link.as_std_path())
            .with_context(|| format!("Failed to create symlink {} -> {}", link, source))?;

        tracing::info!("Linked {} -> {}", link, source);
        Ok(LinkOutcome::Created)
    }

    /// Remove `game_mods/<name>` if, and only if, it is a link.
    pub fn remove_link(&self, name: &str) -> Result<LinkOutcome> {
        if let Err(e) = validate_dir_name(name) {
            tracing::warn!("Refusing to unlink mod: {}", e);
            return Ok(LinkOutcome::Rejected(e));
        }

        let link = self.game_mods_dir.join(name);
        if is_dir_link(&link) {
            remove_dir_link(&link).with_context(|| format!("Failed to remove symlink {}", link))?;
            tracing::info!("Unlinked {}", link);
            return Ok(LinkOutcome::Removed);
        }

        if fs::symlink_metadata(&link).is_ok() {
            tracing::warn!("Not removing {}: it is not a symlink", link);
            return Ok(LinkOutcome::NotALink);
        }

        Ok(LinkOutcome::Absent)
    }

    /// Mark `name` active and link it.
    pub fn activate(&self, registry: &mut ActiveModsRegistry, name: &str) -> Result<LinkOutcome> {
        let outcome = self.create_link(name)?;
        if !matches!(outcome, LinkOutcome::Rejected(_)) {
            registry.set(name, true);
        }
        Ok(outcome)
    }

    /// Mark `name` inactive and unlink it.
    pub fn deactivate(&self, registry: &mut ActiveModsRegistry, name: &str) -> Result<LinkOutcome> {
        let outcome = self.remove_link(name)?;
        if !matches!(outcome, LinkOutcome::Rejected(_)) {
            registry.set(name, false);
        }
        Ok(outcome)
    }

    /// Flip a mod's registry flag and bring its link in line. Returns the new
    /// registry state.
    pub fn toggle(&self, registry: &mut ActiveModsRegistry, name: &str) -> Result<bool> {
        validate_dir_name(name)?;

        let active = registry.toggle(name);
        let outcome = if active {
            self.create_link(name)?
        } else {
            self.remove_link(name)?
        };
        tracing::debug!("Toggled {} to {} ({:?})", name, active, outcome);
        Ok(active)
    }

    /// Names of every link currently in the game mods directory.
    pub fn linked_names(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.game_mods_dir) else {
            return Vec::new();
        };

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| utf8_path(entry.path()))
            .filter(|path| is_dir_link(path))
            .filter_map(|path| path.file_name().map(str::to_string))
            .collect();
        names.sort();
        names
    }

    /// Remove every link in the game mods directory. Real directories stay.
    pub fn remove_all_links(&self) -> Result<usize> {
        let mut removed = 0;
        for name in self.linked_names() {
            if self.remove_link(&name)? == LinkOutcome::Removed {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Create links for every active registry entry.
    pub fn sync_from_registry(&self, registry: &ActiveModsRegistry) -> Result<usize> {
        let mut created = 0;
        for name in registry.active_names() {
            if self.create_link(&name)? == LinkOutcome::Created {
                created += 1;
            }
        }
        Ok(created)
    }

    /// Move every link from the current game mods directory to `new_dir`.
    pub fn switch_game_mods_dir(
        &mut self,
        new_dir: impl Into<Utf8PathBuf>,
        registry: &ActiveModsRegistry,
    ) -> Result<usize> {
        let new_dir = new_dir.into();
        let removed = self.remove_all_links()?;
        tracing::info!(
            "Switching game mods directory {} -> {} ({} links removed)",
            self.game_mods_dir,
            new_dir,
            removed
        );

        self.game_mods_dir = new_dir;
        self.sync_from_registry(registry)
    }

    /// Reconcile the game mods directory with the registry.
    ///
    /// Orphan links are removed and missing links are created. Blocked or
    /// sourceless entries are reported but never fail the run.
    pub fn validate_and_fix(&self, registry: &ActiveModsRegistry) -> Result<FixReport> {
        let mut report = FixReport::default();
        let active: BTreeSet<String> = registry.active_names().into_iter().collect();

        for name in self.linked_names() {
            if !active.contains(&name) && self.remove_link(&name)? == LinkOutcome::Removed {
                report.removed_orphans.push(name);
            }
        }

        for name in active {
            match self.create_link(&name)? {
                LinkOutcome::Created => report.created.push(name),
                LinkOutcome::Occupied => report.blocked.push(name),
                LinkOutcome::SourceMissing => report.missing_sources.push(name),
                _ => {}
            }
        }

        tracing::info!(
            "Link validation: {} orphans removed, {} created, {} blocked, {} missing sources",
            report.removed_orphans.len(),
            report.created.len(),
            report.blocked.len(),
            report.missing_sources.len()
        );
        Ok(report)
    }
}

/// True when `path` itself is a directory link (not followed).
pub fn is_dir_link(path: &Utf8Path) -> bool {
    match fs::symlink_metadata(path) {
        Ok(metadata) => is_link_metadata(&metadata),
        Err(_) => false,
    }
}

#[cfg(windows)]
fn is_link_metadata(metadata: &fs::Metadata) -> bool {
    use std::os::windows::fs::MetadataExt;
    const FILE_ATTRIBUTE_REPARSE_POINT: u32 = 0x400;
    metadata.file_attributes() & FILE_ATTRIBUTE_REPARSE_POINT != 0
}

#[cfg(not(windows))]
fn is_link_metadata(metadata: &fs::Metadata) -> bool {
    metadata.file_type().is_symlink()
}

#[cfg(windows)]
fn create_dir_link(target: &std::path::Path, link: &std::path::Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
}

#[cfg(unix)]
fn create_dir_link(target: &std::path::Path, link: &std::path::Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn remove_dir_link(link: &Utf8Path) -> io::Result<()> {
    fs::remove_dir(link)
}

#[cfg(unix)]
fn remove_dir_link(link: &Utf8Path) -> io::Result<()> {
    fs::remove_file(link)
}
