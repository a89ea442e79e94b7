use crate::models::{Operation, ResultStatus};
use crate::services::library::ModLibrary;
use crate::services::metadata::MetadataCache;
use crate::services::scraper::AuthorSource;
use crate::state::StateManager;
use std::str::FromStr;
use tokio::sync::watch;

/// Which mods an author update visits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UpdateMode {
    /// Only mods without an author
    #[default]
    Smart,
    /// Every mod with a URL
    Full,
}

impl FromStr for UpdateMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "smart" => Ok(UpdateMode::Smart),
            "full" => Ok(UpdateMode::Full),
            other => Err(format!("unknown update mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorUpdateReport {
    pub updated: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
    pub cancelled: bool,
}

/// Fetch authors for library mods one at a time.
///
/// Only the `author` field of a record is changed. Cancellation is checked
/// between mods, so a `mod.json` write that has started always completes.
pub async fn run_author_update<S: AuthorSource>(
    library: &ModLibrary,
    cache: &MetadataCache,
    source: &S,
    mode: UpdateMode,
    state: &StateManager,
    cancel_rx: &watch::Receiver<bool>,
) -> AuthorUpdateReport {
    let names = library.list_mod_dirs();
    let mut report = AuthorUpdateReport::default();

    state.start_operation(Operation::AuthorUpdate, names.len());
    tracing::info!("Author update ({:?}) over {} mods", mode, names.len());

    for name in names {
        if *cancel_rx.borrow() {
            tracing::info!("Author update cancelled");
            report.cancelled = true;
            break;
        }

        state.update_progress(&name);
        let dir = library.root().join(&name);
        let mut record = cache.get(&dir);

        if !record.has_url() || (mode == UpdateMode::Smart && record.has_author()) {
            state.add_mod_result(&name, ResultStatus::Skipped, "nothing to look up");
            report.skipped.push(name);
            continue;
        }

        let Some(author) = source.fetch_author(record.url.trim()).await else {
            state.add_mod_result(&name, ResultStatus::Failed, "author not found");
            report.failed.push(name);
            continue;
        };

        if author == record.author {
            state.add_mod_result(&name, ResultStatus::Skipped, "author unchanged");
            report.skipped.push(name);
            continue;
        }

        record.author = author;
        match cache.store(&dir, &record) {
            Ok(()) => {
                tracing::info!("Author of {} set to {}", name, record.author);
                state.add_mod_result(&name, ResultStatus::Updated, record.author.clone());
                report.updated.push(name);
            }
            Err(e) => {
                tracing::warn!("Failed to save author for {}: {:#}", name, e);
                state.add_mod_result(&name, ResultStatus::Failed, format!("{e:#}"));
                report.failed.push(name);
            }
        }
    }

    state.finish_operation();
    tracing::info!(
        "Author update finished: {} updated, {} skipped, {} failed",
        report.updated.len(),
        report.skipped.len(),
        report.failed.len()
    );
    report
}
