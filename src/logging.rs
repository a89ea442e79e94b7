use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// Where and how the process logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Directory for the daily rotated files (e.g., `<base>/logs`)
    pub dir: Utf8PathBuf,
    /// File name prefix (e.g., "xxmm")
    pub prefix: String,
    pub debug: bool,
    /// Mirror log lines to stderr, leaving stdout to command output
    pub console: bool,
    /// One JSON object per line in the log files
    pub json: bool,
}

impl LogConfig {
    pub fn new(dir: impl Into<Utf8PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            debug: false,
            console: false,
            json: false,
        }
    }

    /// `RUST_LOG` wins when set; otherwise debug or info for everything.
    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(if self.debug { "debug" } else { "info" })
        })
    }
}

/// Install the global subscriber.
///
/// # Returns
/// A guard that must be held for the duration of the program; dropping it
/// flushes and stops the background log writer.
pub fn init(config: &LogConfig) -> Result<WorkerGuard> {
    ensure_dir(&config.dir)?;

    let file_appender = rolling::daily(config.dir.as_std_path(), &config.prefix);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    let console_layer = config.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
    });

    tracing_subscriber::registry()
        .with(config.filter())
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::info!(
        "Logging to {} (debug={}, console={}, json={})",
        config.dir,
        config.debug,
        config.console,
        config.json
    );
    Ok(guard)
}

fn ensure_dir(dir: &Utf8Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory: {}", dir))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_creates_log_dir() {
        let temp_dir = TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp_dir.path().join("logs")).unwrap();
        let config = LogConfig {
            debug: true,
            ..LogConfig::new(&dir, "test")
        };

        // A second global subscriber in the same test binary fails to install,
        // but the directory is created either way
        let _ = init(&config);

        assert!(dir.is_dir());
    }
}
