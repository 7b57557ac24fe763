use crossbeam_channel::{select, Receiver};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::file_search::{FileEvent, FileState};
use crate::cancel::CancellationToken;
use crate::errors::{FileError, SearchError, SearchResult};
use crate::metrics::{ScanMetrics, ScanStats};

/// Why a search reached its verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// `coupon_min` distinct files contained the coupon
    ThresholdReached,
    /// Every file finished scanning before the threshold was reached
    Exhausted,
    /// The search was cancelled before the threshold was reached
    Cancelled,
}

/// Final outcome of one search.
#[derive(Debug)]
pub struct Verdict {
    pub matched: bool,
    pub decision: Decision,
    /// Files credited with a match, in configuration order
    pub matched_files: Vec<PathBuf>,
    /// Failures reported by files before the decision
    pub errors: Vec<FileError>,
    pub stats: ScanStats,
}

impl Verdict {
    /// Collapses the verdict into the engine's boolean-or-error result.
    ///
    /// A failed verdict with file errors becomes [`SearchError::Files`]: an
    /// unreadable coupon file is never reported as a plain "not found".
    pub fn into_result(self) -> SearchResult<bool> {
        if self.matched {
            Ok(true)
        } else if !self.errors.is_empty() {
            Err(SearchError::Files(self.errors))
        } else {
            Ok(false)
        }
    }
}

enum AggregatorState {
    Waiting,
    Decided(Verdict),
    Consumed,
}

/// Counts distinct matched files as their events arrive and decides the
/// verdict.
///
/// The aggregator moves through `Waiting -> Decided -> Consumed`. While
/// waiting it blocks on the file event stream and the cancellation token, it
/// never polls. Each file is credited at most once, however many match
/// notifications it produces. Reaching a decision cancels the shared token so
/// every remaining producer stops. The verdict can be retrieved exactly once.
pub struct Aggregator {
    state: AggregatorState,
    files: Vec<Arc<FileState>>,
    threshold: usize,
    events: Receiver<FileEvent>,
    cancel: CancellationToken,
    metrics: ScanMetrics,
    credited: Vec<bool>,
    finished: Vec<bool>,
    credited_count: usize,
    finished_count: usize,
    errors: Vec<FileError>,
}

impl Aggregator {
    pub(crate) fn new(
        files: Vec<Arc<FileState>>,
        threshold: usize,
        events: Receiver<FileEvent>,
        cancel: CancellationToken,
        metrics: ScanMetrics,
    ) -> Self {
        let n = files.len();
        Self {
            state: AggregatorState::Waiting,
            files,
            threshold,
            events,
            cancel,
            metrics,
            credited: vec![false; n],
            finished: vec![false; n],
            credited_count: 0,
            finished_count: 0,
            errors: Vec::new(),
        }
    }

    /// Number of distinct files credited with a match so far
    pub fn credited_count(&self) -> usize {
        self.credited_count
    }

    /// Whether a verdict has been reached, retrieved or not
    pub fn is_decided(&self) -> bool {
        !matches!(self.state, AggregatorState::Waiting)
    }

    /// Blocks until a verdict is reached and returns it.
    ///
    /// Fails with [`SearchError::AlreadyConsumed`] on every call after the
    /// first one.
    pub fn verdict(&mut self) -> SearchResult<Verdict> {
        self.verdict_within(None)
    }

    /// Like [`Aggregator::verdict`], but cancels the search when no decision
    /// is reached within `timeout`.
    pub fn verdict_within(&mut self, timeout: Option<Duration>) -> SearchResult<Verdict> {
        if let AggregatorState::Waiting = self.state {
            let decision = self.wait(timeout);
            let verdict = self.decide(decision);
            self.state = AggregatorState::Decided(verdict);
        }
        match std::mem::replace(&mut self.state, AggregatorState::Consumed) {
            AggregatorState::Decided(verdict) => Ok(verdict),
            _ => Err(SearchError::AlreadyConsumed),
        }
    }

    fn wait(&mut self, timeout: Option<Duration>) -> Decision {
        let events = self.events.clone();
        let cancelled = self.cancel.notified();
        let deadline = match timeout {
            Some(timeout) => crossbeam_channel::after(timeout),
            None => crossbeam_channel::never(),
        };

        loop {
            if let Some(decision) = self.check() {
                return decision;
            }
            select! {
                recv(events) -> event => match event {
                    Ok(event) => self.apply(event),
                    Err(_) => {
                        warn!("File searches went away before reporting completion");
                        return Decision::Exhausted;
                    }
                },
                recv(cancelled) -> _ => return Decision::Cancelled,
                recv(deadline) -> _ => {
                    debug!("No verdict within {:?}, cancelling", timeout);
                    return Decision::Cancelled;
                }
            }
        }
    }

    fn check(&self) -> Option<Decision> {
        if self.credited_count >= self.threshold {
            Some(Decision::ThresholdReached)
        } else if self.cancel.is_cancelled() {
            Some(Decision::Cancelled)
        } else if self.finished_count == self.files.len() {
            Some(Decision::Exhausted)
        } else {
            None
        }
    }

    fn apply(&mut self, event: FileEvent) {
        match event {
            FileEvent::Matched { index } => {
                if !self.credited[index] {
                    self.credited[index] = true;
                    self.credited_count += 1;
                    debug!(
                        "Credited {} ({}/{})",
                        self.files[index].path().display(),
                        self.credited_count,
                        self.threshold
                    );
                }
            }
            FileEvent::Finished { index, errors } => {
                if !self.finished[index] {
                    self.finished[index] = true;
                    self.finished_count += 1;
                }
                let path = self.files[index].path();
                self.errors.extend(errors.into_iter().map(|error| FileError {
                    path: path.to_path_buf(),
                    error,
                }));
            }
        }
    }

    fn decide(&mut self, decision: Decision) -> Verdict {
        // Stop every producer that is still reading.
        self.cancel.cancel();

        let matched = decision == Decision::ThresholdReached;
        let matched_files = self
            .files
            .iter()
            .zip(&self.credited)
            .filter(|(_, credited)| **credited)
            .map(|(file, _)| file.path().to_path_buf())
            .collect();
        let errors = std::mem::take(&mut self.errors);
        if matched && !errors.is_empty() {
            warn!(
                "Coupon accepted although {} file(s) failed to scan",
                errors.len()
            );
        }

        self.metrics.log_stats();
        info!(
            "Search decided: {:?}, {} of {} required files matched",
            decision, self.credited_count, self.threshold
        );

        Verdict {
            matched,
            decision,
            matched_files,
            errors,
            stats: self.metrics.get_stats(),
        }
    }
}
