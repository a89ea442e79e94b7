//! XXMM - mod library manager for XXMI games
//!
//! Main entry point for the command-line application.
//!
//! # Overview
//!
//! This binary wires the library crate to a clap front end. It initializes:
//! - Logging infrastructure (daily file rotation, optional stderr output)
//! - Tokio async runtime (4 worker threads for HTTP, file watching and
//!   blocking INI rewrites)
//! - The [`AppContext`] composition root (settings, registry, cache, links)
//!
//! # Execution Flow
//!
//! 1. Parse arguments and resolve the base directory
//! 2. Load `Settings/Settings.yaml` (environment overrides via `XXMM_*`)
//! 3. Initialize logging → logs/xxmm.<date>
//! 4. Create tokio runtime with 4 worker threads
//! 5. Build the [`AppContext`] and run the command
//! 6. Log the session metrics and shut the runtime down with a 5s timeout

use anyhow::Result;
use clap::Parser;
use std::time::Duration;
use xxmm::cli::{self, Cli};
use xxmm::context::SETTINGS_DIR;
use xxmm::logging::LogConfig;
use xxmm::{APP_NAME, AppContext, ConfigManager, VERSION};

fn main() -> Result<()> {
    let args = Cli::parse();
    let base_dir = cli::resolve_base_dir(args.base_dir.clone())?;

    let config = ConfigManager::new(base_dir.join(SETTINGS_DIR))?;
    let settings = config.load_settings()?;

    let log_config = LogConfig {
        debug: args.debug || settings.debug_mode,
        console: args.verbose,
        json: settings.log_json,
        ..LogConfig::new(base_dir.join("logs"), APP_NAME)
    };
    // Held until exit so buffered log lines are flushed
    let _log_guard = xxmm::logging::init(&log_config)?;

    tracing::info!("Starting {} v{} in {}", APP_NAME, VERSION, base_dir);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(4)
        .thread_name("xxmm-worker")
        .build()?;

    tracing::debug!("Tokio runtime initialized with {} worker threads", 4);

    let mut ctx = AppContext::with_settings(&base_dir, config, settings)?;
    let result = runtime.block_on(cli::run(args.command, &mut ctx));

    if let Err(e) = &result {
        tracing::error!("Command failed: {:#}", e);
    }
    ctx.metrics().log_summary();

    runtime.shutdown_timeout(Duration::from_secs(5));
    tracing::info!("Shutdown complete");

    result
}
