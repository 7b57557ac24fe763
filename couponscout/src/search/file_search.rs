use crossbeam_channel::Sender;
use rayon::ThreadPool;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

use super::planner::{plan_chunks, ByteRange};
use super::reader::{read_chunk, Line};
use super::scanner::{scan_lines, MatchFlag, ScanOutcome};
use crate::cancel::CancellationToken;
use crate::errors::{SearchError, SearchResult};
use crate::metrics::ScanMetrics;

/// Progress notifications sent by per-file searches to the aggregator.
#[derive(Debug)]
pub enum FileEvent {
    /// The coupon was found in file `index`. Sent at most once per file.
    Matched { index: usize },
    /// Every consumer of file `index` has exited. Always the last event of a file.
    Finished {
        index: usize,
        errors: Vec<SearchError>,
    },
}

/// Observable state of one file's search.
#[derive(Debug)]
pub struct FileState {
    path: PathBuf,
    matched: MatchFlag,
    finished: AtomicBool,
}

impl FileState {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            matched: MatchFlag::new(),
            finished: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the coupon has been seen in this file
    pub fn is_matched(&self) -> bool {
        self.matched.is_set()
    }

    /// Whether every consumer of this file has exited
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub(crate) fn flag(&self) -> &MatchFlag {
        &self.matched
    }
}

/// Worker layout of a per-file search.
#[derive(Debug, Clone, Copy)]
pub struct FileSearchSettings {
    pub producers: NonZeroUsize,
    pub consumers: NonZeroUsize,
    pub queue_capacity_per_producer: NonZeroUsize,
}

impl FileSearchSettings {
    pub fn workers(&self) -> usize {
        self.producers.get() + self.consumers.get()
    }

    /// Shrinks the layout so that `files` concurrent file searches use at
    /// most `max_workers` threads in total.
    ///
    /// The per-file budget is split between producers and consumers in the
    /// configured ratio, keeping at least one of each. Fails only when even
    /// one producer and one consumer per file would exceed the cap.
    pub fn bounded(self, files: usize, max_workers: usize) -> SearchResult<Self> {
        if files * 2 > max_workers {
            return Err(SearchError::config_error(format!(
                "searching {} files needs at least {} workers but at most {} are allowed",
                files,
                files * 2,
                max_workers
            )));
        }
        if files == 0 || files * self.workers() <= max_workers {
            return Ok(self);
        }

        let budget = max_workers / files;
        let producers = (self.producers.get() * budget / self.workers()).clamp(1, budget - 1);
        let consumers = self.consumers.get().min(budget - producers).max(1);
        let bounded = Self {
            producers: NonZeroUsize::new(producers).unwrap_or(NonZeroUsize::MIN),
            consumers: NonZeroUsize::new(consumers).unwrap_or(NonZeroUsize::MIN),
            queue_capacity_per_producer: self.queue_capacity_per_producer,
        };
        debug!(
            "Scaled workers per file from {}+{} to {}+{} to stay within {} workers",
            self.producers, self.consumers, bounded.producers, bounded.consumers, max_workers
        );
        Ok(bounded)
    }
}

struct Shared {
    index: usize,
    state: Arc<FileState>,
    errors: Mutex<Vec<SearchError>>,
    live_consumers: AtomicUsize,
    events: Sender<FileEvent>,
    metrics: ScanMetrics,
}

impl Shared {
    fn new(
        index: usize,
        state: Arc<FileState>,
        consumers: NonZeroUsize,
        events: Sender<FileEvent>,
        metrics: &ScanMetrics,
    ) -> Arc<Self> {
        Arc::new(Self {
            index,
            state,
            errors: Mutex::new(Vec::new()),
            live_consumers: AtomicUsize::new(consumers.get()),
            events,
            metrics: metrics.clone(),
        })
    }

    fn record_error(&self, error: SearchError) {
        warn!("Error searching {}: {}", self.state.path.display(), error);
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(error);
    }

    fn finish(&self) {
        let errors = std::mem::take(
            &mut *self.errors.lock().unwrap_or_else(PoisonError::into_inner),
        );
        if !errors.is_empty() {
            self.metrics.record_file_failed();
        }
        self.state.finished.store(true, Ordering::Release);
        debug!(
            "Finished {} (matched: {}, errors: {})",
            self.state.path.display(),
            self.state.is_matched(),
            errors.len()
        );
        // The aggregator may already have decided and gone away.
        let _ = self.events.send(FileEvent::Finished {
            index: self.index,
            errors,
        });
    }
}

/// Held by every consumer; the last one to drop marks the file finished.
///
/// Dropping also happens while unwinding, so a panicking consumer still
/// releases its share of the completion count.
struct ConsumerGuard(Arc<Shared>);

impl Drop for ConsumerGuard {
    fn drop(&mut self) {
        if self.0.live_consumers.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.finish();
        }
    }
}

/// Starts the search of one file on `pool`.
///
/// Plans the file, then spawns one producer per byte range and
/// `settings.consumers` consumers sharing a bounded queue. The queue closes
/// once every producer has dropped its sender, on any exit path. A planning
/// failure finishes the file immediately with that error. Sibling files are
/// never affected.
#[allow(clippy::too_many_arguments)]
pub fn spawn_file_search(
    pool: &ThreadPool,
    index: usize,
    state: Arc<FileState>,
    token: Arc<[u8]>,
    settings: FileSearchSettings,
    cancel: &CancellationToken,
    events: Sender<FileEvent>,
    metrics: &ScanMetrics,
) {
    let shared = Shared::new(index, state, settings.consumers, events, metrics);

    let ranges = match plan_chunks(&shared.state.path, settings.producers) {
        Ok(ranges) => ranges,
        Err(e) => {
            shared.record_error(e);
            shared.finish();
            return;
        }
    };
    metrics.record_plan(ranges.len());

    spawn_pipeline(pool, &shared, ranges, token, settings, cancel, metrics);
}

/// Spawns the consumers and one producer per planned range.
fn spawn_pipeline(
    pool: &ThreadPool,
    shared: &Arc<Shared>,
    ranges: Vec<ByteRange>,
    token: Arc<[u8]>,
    settings: FileSearchSettings,
    cancel: &CancellationToken,
    metrics: &ScanMetrics,
) {
    let capacity = ranges.len().max(1) * settings.queue_capacity_per_producer.get();
    let (tx, rx) = crossbeam_channel::bounded::<Line>(capacity);

    for _ in 0..settings.consumers.get() {
        let guard = ConsumerGuard(Arc::clone(shared));
        let rx = rx.clone();
        let token = Arc::clone(&token);
        let metrics = metrics.clone();
        pool.spawn(move || {
            let shared = &guard.0;
            let outcome = scan_lines(&rx, &token, shared.state.flag(), &metrics);
            if outcome == ScanOutcome::Matched {
                debug!("Found coupon in {}", shared.state.path.display());
                metrics.record_file_matched();
                let _ = shared.events.send(FileEvent::Matched {
                    index: shared.index,
                });
            }
            // Release the queue before the guard so producers see it abandoned.
            drop(rx);
            drop(guard);
        });
    }
    drop(rx);

    for range in ranges {
        let tx = tx.clone();
        let shared = Arc::clone(shared);
        let cancel = cancel.clone();
        let metrics = metrics.clone();
        pool.spawn(move || {
            if let Err(e) = read_chunk(&shared.state.path, range, &tx, &cancel, &metrics) {
                shared.record_error(e);
            }
        });
    }
}
