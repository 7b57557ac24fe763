use crossbeam_channel::Receiver;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::trace;

use super::reader::Line;
use crate::metrics::ScanMetrics;

/// Per-file match flag.
///
/// The flag only ever moves from unset to set and cannot be cleared.
/// [`MatchFlag::set`] reports whether the caller performed that
/// transition, which lets exactly one consumer announce the match.
#[derive(Debug, Default)]
pub struct MatchFlag(AtomicBool);

impl MatchFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flag. Returns `true` only for the call that changed it.
    pub fn set(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Why a consumer stopped draining its queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// This consumer found the coupon and set the flag
    Matched,
    /// Another consumer of the same file had already set the flag
    AlreadyMatched,
    /// The queue closed without this consumer seeing the coupon
    Drained,
}

/// Drains `queue`, comparing every line to `token` byte for byte.
///
/// Stops at the first match, or as soon as it notices that a sibling consumer
/// already matched. Otherwise runs until every producer has dropped its end of
/// the queue.
pub fn scan_lines(
    queue: &Receiver<Line>,
    token: &[u8],
    flag: &MatchFlag,
    metrics: &ScanMetrics,
) -> ScanOutcome {
    let mut compared = 0u64;
    let outcome = loop {
        if flag.is_set() {
            break ScanOutcome::AlreadyMatched;
        }
        let Ok(line) = queue.recv() else {
            break ScanOutcome::Drained;
        };
        compared += 1;
        if line == token {
            break if flag.set() {
                ScanOutcome::Matched
            } else {
                ScanOutcome::AlreadyMatched
            };
        }
    };

    metrics.record_lines_compared(compared);
    trace!("Consumer stopped: {:?} after {} lines", outcome, compared);
    outcome
}
