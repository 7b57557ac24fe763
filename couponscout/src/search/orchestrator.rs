use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use super::aggregator::{Aggregator, Verdict};
use super::file_search::{spawn_file_search, FileSearchSettings, FileState};
use crate::cancel::CancellationToken;
use crate::errors::{SearchError, SearchResult};
use crate::metrics::ScanMetrics;

/// What to look for and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTarget {
    token: String,
    min_matches: usize,
    files: Vec<PathBuf>,
}

impl SearchTarget {
    /// Builds a target, rejecting thresholds that could never be met.
    pub fn new(
        token: impl Into<String>,
        files: Vec<PathBuf>,
        min_matches: usize,
    ) -> SearchResult<Self> {
        let token = token.into();
        if token.is_empty() {
            return Err(SearchError::config_error("coupon code must not be empty"));
        }
        if min_matches == 0 {
            return Err(SearchError::config_error("minimum match count must be at least 1"));
        }
        if min_matches > files.len() {
            return Err(SearchError::config_error(format!(
                "minimum match count {} exceeds the {} files searched",
                min_matches,
                files.len()
            )));
        }
        Ok(Self {
            token,
            min_matches,
            files,
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn min_matches(&self) -> usize {
        self.min_matches
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

/// A running search.
///
/// Dropping the handle cancels the search. The verdict can be retrieved once;
/// later calls fail with [`SearchError::AlreadyConsumed`].
pub struct SearchHandle {
    aggregator: Aggregator,
    files: Vec<Arc<FileState>>,
    cancel: CancellationToken,
    // Kept alive until the handle is dropped; its threads exit once idle.
    _pool: rayon::ThreadPool,
}

impl SearchHandle {
    /// Blocks until the search is decided.
    ///
    /// Returns `Ok(true)` when the coupon was found in enough files,
    /// `Ok(false)` when it was not or the search was cancelled first, and an
    /// error when it was not found and some file could not be scanned.
    pub fn evaluate(&mut self) -> SearchResult<bool> {
        self.evaluate_verdict()?.into_result()
    }

    /// Like [`SearchHandle::evaluate`], but gives up (and cancels the search)
    /// after `timeout`.
    pub fn evaluate_timeout(&mut self, timeout: Duration) -> SearchResult<bool> {
        self.aggregator.verdict_within(Some(timeout))?.into_result()
    }

    /// Blocks until the search is decided and returns the full verdict.
    pub fn evaluate_verdict(&mut self) -> SearchResult<Verdict> {
        self.aggregator.verdict()
    }

    /// Full verdict, cancelling the search after `timeout`.
    pub fn evaluate_verdict_timeout(&mut self, timeout: Duration) -> SearchResult<Verdict> {
        self.aggregator.verdict_within(Some(timeout))
    }

    /// Per-file match flags and completion state, in target order
    pub fn files(&self) -> &[Arc<FileState>] {
        &self.files
    }

    /// The token shared by every worker of this search
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for SearchHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Starts searching every file of `target` concurrently.
///
/// The search runs on its own worker pool with one thread per producer and
/// consumer, so blocked workers can never starve the ones they wait on. When
/// the configured layout would need more than `max_workers` threads, the
/// producers and consumers per file are scaled down to fit. Every worker
/// checks a child of `cancel`: cancelling the caller's token stops the
/// search, while the search deciding early leaves the caller's token
/// untouched.
pub fn start_search(
    target: &SearchTarget,
    settings: FileSearchSettings,
    max_workers: usize,
    cancel: &CancellationToken,
) -> SearchResult<SearchHandle> {
    let settings = settings.bounded(target.files.len(), max_workers)?;
    let workers = target.files.len() * settings.workers();

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("couponscout-worker-{}", i))
        .panic_handler(|payload| {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!("Search worker panicked: {}", message);
        })
        .build()?;

    info!(
        "Searching {} files for coupon (need {}), {} workers",
        target.files.len(),
        target.min_matches,
        workers
    );

    let shared = cancel.child();
    let metrics = ScanMetrics::new();
    let token: Arc<[u8]> = Arc::from(target.token.as_bytes());
    let files: Vec<Arc<FileState>> = target
        .files
        .iter()
        .map(|path| Arc::new(FileState::new(path.clone())))
        .collect();

    let (events_tx, events_rx) = crossbeam_channel::unbounded();
    for (index, state) in files.iter().enumerate() {
        spawn_file_search(
            &pool,
            index,
            Arc::clone(state),
            Arc::clone(&token),
            settings,
            &shared,
            events_tx.clone(),
            &metrics,
        );
    }
    drop(events_tx);

    let aggregator = Aggregator::new(
        files.clone(),
        target.min_matches,
        events_rx,
        shared.clone(),
        metrics,
    );

    Ok(SearchHandle {
        aggregator,
        files,
        cancel: shared,
        _pool: pool,
    })
}
