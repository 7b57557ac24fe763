use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Counters describing the work done by one search.
///
/// Clones share the same counters, so every worker of a search can record
/// into its own handle while the aggregator reads a consistent-enough
/// snapshot at the end.
#[derive(Debug, Clone)]
pub struct ScanMetrics {
    // Planning
    files_planned: Arc<AtomicU64>,
    chunks_planned: Arc<AtomicU64>,

    // Reading
    bytes_read: Arc<AtomicU64>,
    lines_emitted: Arc<AtomicU64>,
    producers_cancelled: Arc<AtomicU64>,

    // Scanning
    lines_compared: Arc<AtomicU64>,
    files_matched: Arc<AtomicU64>,
    files_failed: Arc<AtomicU64>,
}

impl ScanMetrics {
    pub fn new() -> Self {
        Self {
            files_planned: Arc::new(AtomicU64::new(0)),
            chunks_planned: Arc::new(AtomicU64::new(0)),
            bytes_read: Arc::new(AtomicU64::new(0)),
            lines_emitted: Arc::new(AtomicU64::new(0)),
            producers_cancelled: Arc::new(AtomicU64::new(0)),
            lines_compared: Arc::new(AtomicU64::new(0)),
            files_matched: Arc::new(AtomicU64::new(0)),
            files_failed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Records a file split into `chunks` byte ranges
    pub fn record_plan(&self, chunks: usize) {
        self.files_planned.fetch_add(1, Ordering::Relaxed);
        self.chunks_planned
            .fetch_add(chunks as u64, Ordering::Relaxed);
    }

    /// Records the bytes one producer read from its range
    pub fn record_read(&self, bytes: u64) {
        let total = self.bytes_read.fetch_add(bytes, Ordering::Relaxed) + bytes;
        debug!("Chunk read: {} bytes, total read: {} bytes", bytes, total);
    }

    /// Records lines a producer pushed onto its queue
    pub fn record_lines_emitted(&self, lines: u64) {
        self.lines_emitted.fetch_add(lines, Ordering::Relaxed);
    }

    /// Records a producer that stopped because the search was cancelled
    pub fn record_producer_cancelled(&self) {
        self.producers_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// Records lines a consumer compared against the coupon
    pub fn record_lines_compared(&self, lines: u64) {
        self.lines_compared.fetch_add(lines, Ordering::Relaxed);
    }

    pub fn record_file_matched(&self) {
        self.files_matched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_file_failed(&self) {
        self.files_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Gets the current counters
    pub fn get_stats(&self) -> ScanStats {
        ScanStats {
            files_planned: self.files_planned.load(Ordering::Relaxed),
            chunks_planned: self.chunks_planned.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            lines_emitted: self.lines_emitted.load(Ordering::Relaxed),
            producers_cancelled: self.producers_cancelled.load(Ordering::Relaxed),
            lines_compared: self.lines_compared.load(Ordering::Relaxed),
            files_matched: self.files_matched.load(Ordering::Relaxed),
            files_failed: self.files_failed.load(Ordering::Relaxed),
        }
    }

    /// Logs the current counters
    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Scan stats:\n\
             Files planned/matched/failed: {}/{}/{}\n\
             Chunks planned: {}\n\
             Bytes read: {}\n\
             Lines emitted/compared: {}/{}\n\
             Producers cancelled: {}",
            stats.files_planned,
            stats.files_matched,
            stats.files_failed,
            stats.chunks_planned,
            stats.bytes_read,
            stats.lines_emitted,
            stats.lines_compared,
            stats.producers_cancelled
        );
    }
}

impl Default for ScanMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of [`ScanMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub files_planned: u64,
    pub chunks_planned: u64,
    pub bytes_read: u64,
    pub lines_emitted: u64,
    pub producers_cancelled: u64,
    pub lines_compared: u64,
    pub files_matched: u64,
    pub files_failed: u64,
}
