//! Command-line front end.
//!
//! Parses arguments with clap, dispatches to [`AppContext`] and prints the
//! outcome. Long-running commands (author update, hotkey refresh, Status
//! Keeper watch) stop cleanly on Ctrl-C through a `watch` cancel channel, and
//! their progress is rendered from [`StateChange`] events.

use crate::context::AppContext;
use crate::models::ModRecord;
use crate::services::author_update::UpdateMode;
use crate::services::functions::Function;
use crate::services::library::Disposal;
use crate::services::status_keeper::{SafetyOverrides, SyncReport, SyncTrigger};
use crate::services::symlinks::LinkOutcome;
use crate::state::{StateChange, StateManager};
use anyhow::{Context, Result, bail};
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

#[derive(Debug, Parser)]
#[command(name = "xxmm", author, version, about)]
pub struct Cli {
    /// Application directory holding Settings/, the library and logs
    /// (defaults to the directory of the executable)
    #[arg(long, global = true, value_name = "DIR")]
    pub base_dir: Option<Utf8PathBuf>,

    /// Also log to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Debug-level logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List mods in the library
    List {
        /// Only active mods
        #[arg(long)]
        active: bool,
        /// Only mods of this character
        #[arg(long)]
        character: Option<String>,
    },
    /// Show one mod's metadata
    Show { name: String },
    /// Edit fields of a mod's mod.json
    Edit(EditArgs),
    /// Replace a mod's preview image
    SetPreview { name: String, image: Utf8PathBuf },
    /// Delete a mod folder (to the recycle bin unless --permanent)
    Delete {
        name: String,
        #[arg(long)]
        permanent: bool,
    },
    /// Rename a mod folder, keeping its activation
    Rename { name: String, new_name: String },
    /// Flip a mod between active and inactive
    Toggle { name: String },
    Activate { name: String },
    Deactivate { name: String },
    /// Repair links so they match the active mods registry
    Validate,
    /// Move every link to another game mods directory
    SetModsDir { dir: Utf8PathBuf },
    #[command(subcommand)]
    Preset(PresetCommand),
    /// Fetch authors from GameBanana
    Authors {
        /// Revisit mods that already have an author
        #[arg(long)]
        full: bool,
    },
    /// Collect hotkeys from mod INI files
    Hotkeys {
        /// Revisit mods that already list hotkeys
        #[arg(long)]
        full: bool,
        /// Refresh a single mod
        name: Option<String>,
    },
    #[command(subcommand)]
    StatusKeeper(StatusKeeperCommand),
    #[command(subcommand)]
    ModInfo(ModInfoCommand),
    #[command(subcommand)]
    Functions(FunctionsCommand),
}

#[derive(Debug, Args)]
pub struct EditArgs {
    pub name: String,
    #[arg(long)]
    pub author: Option<String>,
    #[arg(long)]
    pub character: Option<String>,
    #[arg(long)]
    pub url: Option<String>,
    #[arg(long)]
    pub version: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum PresetCommand {
    /// Save the current active set
    Save { name: String },
    /// Replace the active set with a preset
    Load { name: String },
    Delete { name: String },
    List,
}

#[derive(Debug, Subcommand)]
pub enum StatusKeeperCommand {
    /// Run one sync cycle
    Sync,
    /// Sync on d3dx_user.ini changes and on a timer until Ctrl-C
    Watch,
    /// Write .msk backups of mod INI files
    Backup,
    /// Restore INI files from their .msk backups
    Restore(SafetyArgs),
    /// Delete every .msk backup
    DeleteBackups(SafetyArgs),
}

#[derive(Debug, Clone, Copy, Args)]
pub struct SafetyArgs {
    #[arg(long = "safety-1")]
    pub first: bool,
    #[arg(long = "safety-2")]
    pub second: bool,
    #[arg(long = "safety-3")]
    pub third: bool,
}

impl From<SafetyArgs> for SafetyOverrides {
    fn from(args: SafetyArgs) -> Self {
        Self {
            first: args.first,
            second: args.second,
            third: args.third,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum ModInfoCommand {
    /// Back up mod.json and previews of every mod
    Backup,
    /// Restore a backup set (1 is the newest)
    Restore { set: u32 },
    /// Delete every backup set
    Delete,
    List,
}

#[derive(Debug, Subcommand)]
pub enum FunctionsCommand {
    List,
    Enable { function: Function },
    Disable { function: Function },
}

/// Directory the application works in when `--base-dir` is not given.
pub fn resolve_base_dir(base_dir: Option<Utf8PathBuf>) -> Result<Utf8PathBuf> {
    if let Some(dir) = base_dir {
        return Ok(dir);
    }
    let exe = std::env::current_exe().context("Failed to locate the executable")?;
    let dir = exe
        .parent()
        .with_context(|| format!("Executable has no parent directory: {}", exe.display()))?;
    Utf8PathBuf::from_path_buf(dir.to_path_buf())
        .map_err(|p| anyhow::anyhow!("Executable directory is not valid UTF-8: {}", p.display()))
}

/// Execute one command against the context.
pub async fn run(command: Command, ctx: &mut AppContext) -> Result<()> {
    match command {
        Command::List { active, character } => list(ctx, active, character.as_deref()),
        Command::Show { name } => {
            let record = ctx.record(&name)?;
            print_record(&record, ctx.is_active(&name));
            Ok(())
        }
        Command::Edit(args) => edit(ctx, args),
        Command::SetPreview { name, image } => {
            let dest = ctx.set_preview(&name, &image)?;
            println!("Preview of {name} set to {dest}");
            Ok(())
        }
        Command::Delete { name, permanent } => {
            let disposal = if permanent {
                Disposal::Permanent
            } else {
                Disposal::RecycleBin
            };
            ctx.delete_mod(&name, disposal)?;
            println!("{name}: deleted");
            Ok(())
        }
        Command::Rename { name, new_name } => {
            ctx.rename_mod(&name, &new_name)?;
            println!("{name}: renamed to {new_name}");
            Ok(())
        }
        Command::Toggle { name } => {
            let active = ctx.toggle_mod(&name)?;
            println!("{name}: {}", if active { "active" } else { "inactive" });
            Ok(())
        }
        Command::Activate { name } => {
            let outcome = ctx.activate_mod(&name)?;
            println!("{name}: {}", describe_outcome(&outcome));
            Ok(())
        }
        Command::Deactivate { name } => {
            let outcome = ctx.deactivate_mod(&name)?;
            println!("{name}: {}", describe_outcome(&outcome));
            Ok(())
        }
        Command::Validate => {
            let report = ctx.validate_links()?;
            println!(
                "{} orphaned links removed, {} links created",
                report.removed_orphans.len(),
                report.created.len()
            );
            for name in &report.blocked {
                println!("  blocked (not a link): {name}");
            }
            for name in &report.missing_sources {
                println!("  missing from library: {name}");
            }
            Ok(())
        }
        Command::SetModsDir { dir } => {
            let created = ctx.set_game_mods_dir(dir)?;
            println!("Game mods directory is now {} ({created} links)", ctx.paths().game_mods);
            Ok(())
        }
        Command::Preset(command) => preset(ctx, command),
        Command::Authors { full } => {
            ensure_enabled(ctx, Function::GameBananaAuthorUpdate)?;
            let mode = if full { UpdateMode::Full } else { UpdateMode::Smart };
            let cancel_rx = cancel_on_ctrl_c();
            let printer = spawn_progress_printer(ctx.state());
            let result = ctx.update_authors(mode, &cancel_rx).await;
            printer.abort();

            let report = result?;
            println!(
                "Authors: {} updated, {} skipped, {} failed{}",
                report.updated.len(),
                report.skipped.len(),
                report.failed.len(),
                if report.cancelled { " (cancelled)" } else { "" }
            );
            Ok(())
        }
        Command::Hotkeys { full, name } => {
            ensure_enabled(ctx, Function::HotkeyFinder)?;
            if let Some(name) = name {
                let status = ctx.refresh_mod_hotkeys(&name)?;
                println!("{name}: hotkeys {}", status.as_str());
                return Ok(());
            }

            let cancel_rx = cancel_on_ctrl_c();
            let printer = spawn_progress_printer(ctx.state());
            let report = ctx.refresh_hotkeys(!full, &cancel_rx);
            printer.abort();
            println!(
                "Hotkeys: {} updated, {} skipped, {} failed{}",
                report.updated.len(),
                report.skipped.len(),
                report.failed.len(),
                if report.cancelled { " (cancelled)" } else { "" }
            );
            Ok(())
        }
        Command::StatusKeeper(command) => {
            ensure_enabled(ctx, Function::StatusKeeper)?;
            status_keeper(ctx, command).await
        }
        Command::ModInfo(command) => {
            ensure_enabled(ctx, Function::ModInfoBackup)?;
            mod_info(ctx, command)
        }
        Command::Functions(command) => functions(ctx, command),
    }
}

fn list(ctx: &AppContext, active_only: bool, character: Option<&str>) -> Result<()> {
    let active = ctx.active_names();
    let records: Vec<ModRecord> = ctx
        .records()
        .into_iter()
        .filter(|r| !active_only || active.contains(&r.name))
        .filter(|r| character.is_none_or(|c| r.character.eq_ignore_ascii_case(c)))
        .collect();

    for record in &records {
        let marker = if active.contains(&record.name) { '*' } else { ' ' };
        let author = if record.has_author() { record.author.as_str() } else { "-" };
        println!("{marker} {:<40} {:<16} {author}", record.name, record.character);
    }
    println!("{} mods, {} active", records.len(), active.len());
    Ok(())
}

fn print_record(record: &ModRecord, active: bool) {
    println!("{}", record.name);
    println!("  active:    {}", if active { "yes" } else { "no" });
    println!("  character: {}", record.character);
    for (label, value) in [
        ("author", &record.author),
        ("url", &record.url),
        ("version", &record.version),
        ("checked", &record.date_checked),
        ("updated", &record.date_updated),
    ] {
        if !value.is_empty() {
            println!("  {:<10} {}", format!("{label}:"), value);
        }
    }
    if let Some(preview) = &record.preview {
        println!("  preview:   {preview}");
    }
    if !record.hotkeys.is_empty() {
        println!("  hotkeys:");
        for hotkey in &record.hotkeys {
            println!("    {:<24} {}", hotkey.key, hotkey.description);
        }
    }
}

fn edit(ctx: &AppContext, args: EditArgs) -> Result<()> {
    let EditArgs {
        name,
        author,
        character,
        url,
        version,
    } = args;
    if author.is_none() && character.is_none() && url.is_none() && version.is_none() {
        bail!("Nothing to edit; pass at least one of --author, --character, --url, --version");
    }

    let record = ctx.update_record(&name, |record| {
        if let Some(author) = author {
            record.author = author;
        }
        if let Some(character) = character {
            record.character = character;
        }
        if let Some(url) = url {
            record.url = url;
        }
        if let Some(version) = version {
            record.version = version;
        }
    })?;
    print_record(&record, ctx.is_active(&name));
    Ok(())
}

fn preset(ctx: &AppContext, command: PresetCommand) -> Result<()> {
    match command {
        PresetCommand::Save { name } => {
            ctx.save_preset(&name)?;
            println!("Saved preset '{name}'");
        }
        PresetCommand::Load { name } => {
            let report = ctx.load_preset(&name)?;
            println!(
                "Loaded preset '{name}': {} links removed, {} created, {} active",
                report.links_removed, report.links_created, report.active
            );
        }
        PresetCommand::Delete { name } => {
            ctx.delete_preset(&name)?;
            println!("Deleted preset '{name}'");
        }
        PresetCommand::List => {
            for name in ctx.list_presets()? {
                println!("{name}");
            }
        }
    }
    Ok(())
}

async fn status_keeper(ctx: &AppContext, command: StatusKeeperCommand) -> Result<()> {
    match command {
        StatusKeeperCommand::Sync => {
            let report = ctx.status_keeper_runner().trigger(SyncTrigger::Manual).await?;
            print_sync_report(&report);
        }
        StatusKeeperCommand::Watch => {
            let runner = ctx.status_keeper_runner();
            let printer = spawn_progress_printer(ctx.state());
            println!("Watching {} (Ctrl-C to stop)", ctx.paths().d3dx_user_ini);
            let result = runner.run(cancel_on_ctrl_c()).await;
            printer.abort();
            result?;
        }
        StatusKeeperCommand::Backup => {
            let report = ctx.status_keeper_backup().backup()?;
            println!(
                "Backed up {} INI files ({} already had a backup, {} failed)",
                report.processed,
                report.skipped,
                report.failed.len()
            );
        }
        StatusKeeperCommand::Restore(safety) => {
            let mut overrides = SafetyOverrides::from(safety);
            let report = ctx.status_keeper_backup().restore(&mut overrides)?;
            println!("Restored {} INI files ({} failed)", report.processed, report.failed.len());
        }
        StatusKeeperCommand::DeleteBackups(safety) => {
            let mut overrides = SafetyOverrides::from(safety);
            let report = ctx.status_keeper_backup().delete(&mut overrides)?;
            println!("Deleted {} backups ({} failed)", report.processed, report.failed.len());
        }
    }
    Ok(())
}

fn print_sync_report(report: &SyncReport) {
    println!(
        "Synced {} variables into {} files ({} LOD), {} values changed",
        report.variables,
        report.main_files_updated.len(),
        report.lod_files_updated,
        report.values_changed
    );
    for target in &report.unresolved {
        println!("  unresolved: {target}");
    }
    for path in &report.failed {
        println!("  failed: {path}");
    }
}

fn mod_info(ctx: &AppContext, command: ModInfoCommand) -> Result<()> {
    let backups = ctx.mod_info_backup();
    match command {
        ModInfoCommand::Backup => {
            let report = backups.backup(ctx.library())?;
            println!("Backed up {} files from {} mods", report.files, report.mods);
        }
        ModInfoCommand::Restore { set } => {
            let report = backups.restore(set, ctx.library(), ctx.cache())?;
            println!("Restored {} files into {} mods", report.files, report.mods);
        }
        ModInfoCommand::Delete => {
            backups.delete_all()?;
            println!("Deleted all mod info backups");
        }
        ModInfoCommand::List => {
            for set in backups.list() {
                println!("{set}: {}", backups.set_dir(set));
            }
        }
    }
    Ok(())
}

fn functions(ctx: &AppContext, command: FunctionsCommand) -> Result<()> {
    let registry = ctx.functions();
    match command {
        FunctionsCommand::List => {
            for (function, enabled) in registry.list() {
                println!("{:<16} {}", function, if enabled { "enabled" } else { "disabled" });
            }
        }
        FunctionsCommand::Enable { function } => registry.set_enabled(function, true)?,
        FunctionsCommand::Disable { function } => registry.set_enabled(function, false)?,
    }
    Ok(())
}

fn ensure_enabled(ctx: &AppContext, function: Function) -> Result<()> {
    if !ctx.functions().is_enabled(function) {
        bail!("{function} is disabled; run `xxmm functions enable {function}` first");
    }
    Ok(())
}

fn describe_outcome(outcome: &LinkOutcome) -> String {
    match outcome {
        LinkOutcome::Created => "linked".to_string(),
        LinkOutcome::AlreadyLinked => "already linked".to_string(),
        LinkOutcome::Occupied => "a non-link entry with this name is in the way".to_string(),
        LinkOutcome::SourceMissing => "not in the library".to_string(),
        LinkOutcome::Removed => "unlinked".to_string(),
        LinkOutcome::NotALink => "left alone (not a link)".to_string(),
        LinkOutcome::Absent => "was not linked".to_string(),
        LinkOutcome::Rejected(e) => format!("rejected: {e}"),
    }
}

/// Cancel channel flipped to `true` on the first Ctrl-C.
fn cancel_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, stopping after the current item");
            let _ = tx.send(true);
        }
    });
    rx
}

/// Render state events on stderr until aborted.
fn spawn_progress_printer(state: &StateManager) -> JoinHandle<()> {
    let mut rx = state.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(change) => {
                    if let Some(line) = progress_line(&change) {
                        eprintln!("{line}");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::trace!("Progress printer skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn progress_line(change: &StateChange) -> Option<String> {
    match change {
        StateChange::OperationStarted { operation, total } => {
            Some(format!("{operation}: {total} mods"))
        }
        StateChange::ProgressUpdated {
            current,
            total,
            current_mod: Some(name),
        } => Some(format!("[{current}/{total}] {name}")),
        StateChange::StatusKeeperSynced { files_updated } if *files_updated > 0 => {
            Some(format!("Status Keeper updated {files_updated} files"))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Operation;

    #[test]
    fn test_parse_status_keeper_restore_flags() {
        let cli = Cli::try_parse_from([
            "xxmm",
            "status-keeper",
            "restore",
            "--safety-1",
            "--safety-3",
        ])
        .unwrap();

        let Command::StatusKeeper(StatusKeeperCommand::Restore(safety)) = cli.command else {
            panic!("expected status-keeper restore");
        };
        let overrides = SafetyOverrides::from(safety);
        assert!(overrides.first && !overrides.second && overrides.third);
        assert!(!overrides.all_enabled());
    }

    #[test]
    fn test_parse_global_flags_and_function() {
        let cli = Cli::try_parse_from([
            "xxmm",
            "functions",
            "disable",
            "hotkey-finder",
            "--base-dir",
            "/tmp/xxmm",
            "--debug",
        ])
        .unwrap();

        assert!(cli.debug);
        assert_eq!(cli.base_dir, Some(Utf8PathBuf::from("/tmp/xxmm")));
        assert!(matches!(
            cli.command,
            Command::Functions(FunctionsCommand::Disable {
                function: Function::HotkeyFinder
            })
        ));
    }

    #[test]
    fn test_parse_delete_and_rename() {
        let cli = Cli::try_parse_from(["xxmm", "delete", "Hat", "--permanent"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Delete { ref name, permanent: true } if name == "Hat"
        ));

        let cli = Cli::try_parse_from(["xxmm", "rename", "Hat", "Cap"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Rename { ref name, ref new_name } if name == "Hat" && new_name == "Cap"
        ));
    }

    #[test]
    fn test_rejects_unknown_function() {
        assert!(Cli::try_parse_from(["xxmm", "functions", "enable", "teleporter"]).is_err());
    }

    #[test]
    fn test_progress_lines() {
        let started = StateChange::OperationStarted {
            operation: Operation::HotkeyRefresh,
            total: 3,
        };
        assert_eq!(progress_line(&started).unwrap(), "Hotkey refresh: 3 mods");
        assert!(progress_line(&StateChange::StatusKeeperSynced { files_updated: 0 }).is_none());
    }
}
