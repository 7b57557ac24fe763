use crossbeam_channel::Sender;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::trace;

use super::planner::ByteRange;
use crate::cancel::CancellationToken;
use crate::errors::{SearchError, SearchResult};
use crate::metrics::ScanMetrics;

const BUFFER_CAPACITY: usize = 65536;
const LINE_CAPACITY: usize = 64;

/// One raw line, without its terminator.
pub type Line = Vec<u8>;

/// How a producer left its byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Every line of the range was queued
    Exhausted,
    /// The cancellation token fired before the range was finished
    Cancelled,
    /// Every consumer of the queue had already exited
    Abandoned,
}

/// Reads `range` of the file at `path` and queues each of its lines.
///
/// The producer opens its own handle so that readers of the same file never
/// contend on a shared cursor. The token is checked before every push; once
/// it fires the rest of the range is skipped. Lines are split on `\n` and a
/// trailing `\r` is dropped.
pub fn read_chunk(
    path: &Path,
    range: ByteRange,
    queue: &Sender<Line>,
    cancel: &CancellationToken,
    metrics: &ScanMetrics,
) -> SearchResult<ReadOutcome> {
    if range.is_empty() {
        return Ok(ReadOutcome::Exhausted);
    }

    let mut file = File::open(path).map_err(|e| SearchError::from_io(path, e))?;
    file.seek(SeekFrom::Start(range.start))
        .map_err(|e| SearchError::read_error(path, e))?;
    let mut reader = BufReader::with_capacity(BUFFER_CAPACITY, file.take(range.len()));

    let mut bytes_read = 0u64;
    let mut lines = 0u64;
    let outcome = loop {
        let mut line = Vec::with_capacity(LINE_CAPACITY);
        let n = reader
            .read_until(b'\n', &mut line)
            .map_err(|e| SearchError::read_error(path, e))?;
        if n == 0 {
            break ReadOutcome::Exhausted;
        }
        bytes_read += n as u64;
        trim_terminator(&mut line);

        if cancel.is_cancelled() {
            metrics.record_producer_cancelled();
            break ReadOutcome::Cancelled;
        }
        if queue.send(line).is_err() {
            break ReadOutcome::Abandoned;
        }
        lines += 1;
    };

    metrics.record_read(bytes_read);
    metrics.record_lines_emitted(lines);
    trace!(
        "Range [{}, {}) of {} finished: {:?} after {} lines",
        range.start,
        range.end,
        path.display(),
        outcome,
        lines
    );

    if outcome == ReadOutcome::Exhausted && bytes_read < range.len() {
        return Err(SearchError::read_error(
            path,
            io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "range [{}, {}) ended after {} bytes",
                    range.start, range.end, bytes_read
                ),
            ),
        ));
    }
    Ok(outcome)
}

fn trim_terminator(line: &mut Line) {
    if line.last() == Some(&b'\n') {
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
    }
}
