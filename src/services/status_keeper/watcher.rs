//! Triggers for Status Keeper sync: manual, `d3dx_user.ini` changes and a
//! periodic timer, all funnelled into one serialized sync routine.

use super::sync::{StatusKeeperSync, SyncReport};
use crate::metrics::Metrics;
use crate::models::StatusKeeperSettings;
use crate::services::metadata::MetadataCache;
use crate::state::StateManager;
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    Manual,
    FileChanged,
    Timer,
}

pub struct StatusKeeperRunner {
    sync: Arc<StatusKeeperSync>,
    cache: Arc<MetadataCache>,
    state: StateManager,
    metrics: Arc<Metrics>,
    settings: StatusKeeperSettings,
    running: Mutex<()>,
}

impl StatusKeeperRunner {
    pub fn new(
        sync: StatusKeeperSync,
        cache: Arc<MetadataCache>,
        state: StateManager,
        metrics: Arc<Metrics>,
        settings: StatusKeeperSettings,
    ) -> Self {
        Self {
            sync: Arc::new(sync),
            cache,
            state,
            metrics,
            settings,
            running: Mutex::new(()),
        }
    }

    /// Run one sync cycle. Concurrent triggers wait for the running cycle and
    /// then find nothing left to change.
    pub async fn trigger(&self, trigger: SyncTrigger) -> Result<SyncReport> {
        let _guard = self.running.lock().await;
        tracing::debug!("Status Keeper sync triggered: {:?}", trigger);

        let started = Instant::now();
        let sync = Arc::clone(&self.sync);
        let cache = Arc::clone(&self.cache);
        let report = tokio::task::spawn_blocking(move || sync.run(&cache))
            .await
            .context("Status Keeper sync task failed")??;

        self.metrics.record_sync(
            report.main_files_updated.len(),
            report.lod_files_updated,
            started.elapsed(),
        );
        self.state.status_keeper_synced(report.files_updated());
        Ok(report)
    }

    /// Watch `d3dx_user.ini` and poll on a timer until `cancel_rx` flips to
    /// true. Starts with a manual sync. With `auto_sync` off neither the
    /// watcher nor the timer triggers anything.
    pub async fn run(&self, mut cancel_rx: watch::Receiver<bool>) -> Result<()> {
        if let Err(e) = self.trigger(SyncTrigger::Manual).await {
            tracing::warn!("Initial Status Keeper sync failed: {:#}", e);
        }

        let auto_sync = self.settings.auto_sync;
        let (tx, mut rx) = mpsc::channel::<()>(100);
        let _watcher = if auto_sync {
            match self.watch_source(tx) {
                Ok(watcher) => Some(watcher),
                Err(e) => {
                    tracing::warn!("File watching unavailable, using timer only: {:#}", e);
                    None
                }
            }
        } else {
            tracing::info!("Automatic Status Keeper sync is off; waiting for cancel");
            None
        };

        let period = Duration::from_secs(self.settings.poll_interval_secs.max(1));
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let debounce = Duration::from_millis(self.settings.debounce_millis);

        tracing::info!(
            "Status Keeper watching {} (every {}s, auto_sync={})",
            self.sync.d3dx_user_ini(),
            period.as_secs(),
            auto_sync
        );

        loop {
            let trigger = tokio::select! {
                changed = cancel_rx.changed() => {
                    if changed.is_err() || *cancel_rx.borrow() {
                        break;
                    }
                    continue;
                }
                _ = interval.tick(), if auto_sync => SyncTrigger::Timer,
                Some(()) = rx.recv(), if auto_sync => {
                    // Let a burst of writes settle, still honouring cancel
                    tokio::select! {
                        changed = cancel_rx.changed() => {
                            if changed.is_err() || *cancel_rx.borrow() {
                                break;
                            }
                        }
                        _ = tokio::time::sleep(debounce) => {}
                    }
                    while rx.try_recv().is_ok() {}
                    SyncTrigger::FileChanged
                }
            };

            if let Err(e) = self.trigger(trigger).await {
                tracing::warn!("Status Keeper sync failed: {:#}", e);
            }
        }

        tracing::info!("Status Keeper watcher stopped");
        Ok(())
    }

    fn watch_source(&self, tx: mpsc::Sender<()>) -> Result<RecommendedWatcher> {
        let ini = self.sync.d3dx_user_ini().to_path_buf();
        let dir = ini
            .parent()
            .with_context(|| format!("No parent directory for {}", ini))?
            .to_path_buf();
        let file_name = ini.file_name().unwrap_or_default().to_ascii_lowercase();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let Ok(event) = res else {
                return;
            };
            if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                return;
            }
            let touches_source = event.paths.iter().any(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.to_ascii_lowercase() == file_name)
            });
            if touches_source {
                let _ = tx.try_send(());
            }
        })
        .context("Failed to create file watcher")?;

        watcher
            .watch(dir.as_std_path(), RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", dir))?;
        Ok(watcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::library::ModLibrary;
    use camino::Utf8PathBuf;
    use std::fs;
    use tempfile::TempDir;

    fn runner(temp: &TempDir) -> (StatusKeeperRunner, Utf8PathBuf) {
        runner_with(temp, StatusKeeperSettings::default())
    }

    fn runner_with(temp: &TempDir, settings: StatusKeeperSettings) -> (StatusKeeperRunner, Utf8PathBuf) {
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
        let library = root.join("ModLibrary");
        fs::create_dir_all(library.join("ModFolder")).unwrap();
        fs::write(library.join("ModFolder").join("KeySwaps.ini"), "[Constants]\n$toggle = 0\n").unwrap();
        fs::write(root.join("d3dx_user.ini"), "$\\ModFolder\\KeySwaps.ini\\toggle = 1\n").unwrap();

        let sync = StatusKeeperSync::new(ModLibrary::new(&library), root.join("d3dx_user.ini"));
        let runner = StatusKeeperRunner::new(
            sync,
            Arc::new(MetadataCache::new()),
            StateManager::new(),
            Arc::new(Metrics::new()),
            settings,
        );
        (runner, library)
    }

    #[tokio::test]
    async fn test_trigger_updates_state_and_metrics() {
        let temp = TempDir::new().unwrap();
        let (runner, library) = runner(&temp);

        let report = runner.trigger(SyncTrigger::Manual).await.unwrap();

        assert_eq!(report.files_updated(), 1);
        assert_eq!(runner.state.snapshot().sync_runs, 1);
        assert_eq!(runner.metrics.sync_runs.load(std::sync::atomic::Ordering::Relaxed), 1);
        assert_eq!(
            fs::read_to_string(library.join("ModFolder").join("KeySwaps.ini")).unwrap(),
            "[Constants]\n$toggle = 1\n"
        );
    }

    #[tokio::test]
    async fn test_concurrent_triggers_are_serialized() {
        let temp = TempDir::new().unwrap();
        let (runner, _library) = runner(&temp);

        let (a, b) = tokio::join!(
            runner.trigger(SyncTrigger::Manual),
            runner.trigger(SyncTrigger::Timer)
        );

        assert_eq!(a.unwrap().files_updated() + b.unwrap().files_updated(), 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let temp = TempDir::new().unwrap();
        let (runner, _library) = runner(&temp);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let handle = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel_tx.send(true).unwrap();
        };
        let (result, ()) = tokio::join!(runner.run(cancel_rx), handle);

        assert!(result.is_ok());
        assert_eq!(runner.state.snapshot().sync_runs, 1);
    }

    #[tokio::test]
    async fn test_cancel_during_debounce_stops_promptly() {
        let temp = TempDir::new().unwrap();
        let settings = StatusKeeperSettings {
            debounce_millis: 60_000,
            ..StatusKeeperSettings::default()
        };
        let (runner, _library) = runner_with(&temp, settings);
        let source = temp.path().join("d3dx_user.ini");
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let driver = async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            fs::write(&source, "$\\ModFolder\\KeySwaps.ini\\toggle = 0\n").unwrap();
            tokio::time::sleep(Duration::from_millis(500)).await;
            cancel_tx.send(true).unwrap();
        };
        let (result, ()) = tokio::time::timeout(Duration::from_secs(10), async {
            tokio::join!(runner.run(cancel_rx), driver)
        })
        .await
        .expect("runner ignored cancel while debouncing");

        assert!(result.is_ok());
        assert_eq!(runner.state.snapshot().sync_runs, 1);
    }

    #[tokio::test]
    async fn test_auto_sync_off_ignores_source_changes() {
        let temp = TempDir::new().unwrap();
        let settings = StatusKeeperSettings {
            auto_sync: false,
            poll_interval_secs: 1,
            debounce_millis: 10,
        };
        let (runner, library) = runner_with(&temp, settings);
        let source = temp.path().join("d3dx_user.ini");
        let target = library.join("ModFolder").join("KeySwaps.ini");
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let driver = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            fs::write(&source, "$\\ModFolder\\KeySwaps.ini\\toggle = 5\n").unwrap();
            tokio::time::sleep(Duration::from_millis(1500)).await;
            cancel_tx.send(true).unwrap();
        };
        let (result, ()) = tokio::join!(runner.run(cancel_rx), driver);

        assert!(result.is_ok());
        assert_eq!(runner.state.snapshot().sync_runs, 1);
        assert_eq!(fs::read_to_string(&target).unwrap(), "[Constants]\n$toggle = 1\n");
    }
}
