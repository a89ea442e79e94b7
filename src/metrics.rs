// Performance metrics module
//
// Lightweight counters for what the manager did during this process lifetime

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Process-wide operation counters
///
/// Uses atomic operations for thread-safe tracking without locks. The
/// summary is logged on shutdown.
#[derive(Debug)]
pub struct Metrics {
    /// Symlinks created in the game mods directory
    pub links_created: AtomicU64,

    /// Symlinks removed from the game mods directory
    pub links_removed: AtomicU64,

    /// Activation toggles performed
    pub mods_toggled: AtomicU64,

    /// Status Keeper sync cycles run
    pub sync_runs: AtomicU64,

    /// Main INI files rewritten by Status Keeper
    pub ini_files_rewritten: AtomicU64,

    /// LOD INI files rewritten by Status Keeper
    pub lod_files_rewritten: AtomicU64,

    /// Authors written into mod.json
    pub authors_updated: AtomicU64,

    /// Hotkey lists written into mod.json
    pub hotkeys_updated: AtomicU64,

    /// Total time spent in Status Keeper sync, in milliseconds
    pub total_sync_time_ms: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            links_created: AtomicU64::new(0),
            links_removed: AtomicU64::new(0),
            mods_toggled: AtomicU64::new(0),
            sync_runs: AtomicU64::new(0),
            ini_files_rewritten: AtomicU64::new(0),
            lod_files_rewritten: AtomicU64::new(0),
            authors_updated: AtomicU64::new(0),
            hotkeys_updated: AtomicU64::new(0),
            total_sync_time_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_links_created(&self, count: usize) {
        self.links_created.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_links_removed(&self, count: usize) {
        self.links_removed.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_toggle(&self) {
        self.mods_toggled.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one sync cycle with its rewritten file counts and duration
    pub fn record_sync(&self, main_files: usize, lod_files: usize, duration: Duration) {
        self.sync_runs.fetch_add(1, Ordering::Relaxed);
        self.ini_files_rewritten
            .fetch_add(main_files as u64, Ordering::Relaxed);
        self.lod_files_rewritten
            .fetch_add(lod_files as u64, Ordering::Relaxed);
        self.total_sync_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_authors_updated(&self, count: usize) {
        self.authors_updated.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_hotkeys_updated(&self, count: usize) {
        self.hotkeys_updated.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average duration of a sync cycle in milliseconds
    pub fn avg_sync_time_ms(&self) -> f64 {
        let total = self.total_sync_time_ms.load(Ordering::Relaxed);
        let count = self.sync_runs.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        tracing::info!("=== Session Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Links: {} created, {} removed, {} toggles",
            self.links_created.load(Ordering::Relaxed),
            self.links_removed.load(Ordering::Relaxed),
            self.mods_toggled.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Status Keeper: {} syncs (avg {:.2}ms), {} INI and {} LOD files rewritten",
            self.sync_runs.load(Ordering::Relaxed),
            self.avg_sync_time_ms(),
            self.ini_files_rewritten.load(Ordering::Relaxed),
            self.lod_files_rewritten.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Metadata: {} authors, {} hotkey lists updated",
            self.authors_updated.load(Ordering::Relaxed),
            self.hotkeys_updated.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new();
        assert_eq!(metrics.links_created.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.sync_runs.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_record_links() {
        let metrics = Metrics::new();

        metrics.record_links_created(3);
        metrics.record_links_removed(1);
        metrics.record_toggle();
        metrics.record_toggle();

        assert_eq!(metrics.links_created.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.links_removed.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.mods_toggled.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_record_sync() {
        let metrics = Metrics::new();

        metrics.record_sync(2, 1, Duration::from_millis(100));
        metrics.record_sync(0, 0, Duration::from_millis(200));

        assert_eq!(metrics.sync_runs.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.ini_files_rewritten.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.lod_files_rewritten.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.avg_sync_time_ms(), 150.0);
    }

    #[test]
    fn test_avg_sync_time_no_runs() {
        let metrics = Metrics::new();
        assert_eq!(metrics.avg_sync_time_ms(), 0.0);
    }

    #[test]
    fn test_uptime() {
        let metrics = Metrics::new();
        thread::sleep(Duration::from_millis(10));
        assert!(metrics.uptime().as_millis() >= 10);
    }
}
