use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::num::NonZeroUsize;
use std::path::Path;
use tracing::{debug, trace};

use crate::errors::{SearchError, SearchResult};

const PROBE_BUFFER_CAPACITY: usize = 4096;

/// A line-aligned slice of a file, `start` inclusive and `end` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Splits the file at `path` into `chunks` contiguous byte ranges.
///
/// Every range except the last one is roughly `size / chunks` bytes long and
/// ends just past a newline: from the naive cut point the planner scans
/// forward until it meets a `\n`, so no line is ever split between two
/// ranges. A scan that runs into end-of-file ends the range there. The last
/// range always extends to end-of-file, absorbing the remainder, which means
/// ranges may be empty when the file holds fewer lines than `chunks`.
pub fn plan_chunks(path: &Path, chunks: NonZeroUsize) -> SearchResult<Vec<ByteRange>> {
    let file = File::open(path).map_err(|e| SearchError::from_io(path, e))?;
    let size = file
        .metadata()
        .map_err(|e| SearchError::from_io(path, e))?
        .len();

    let chunks = chunks.get();
    let median = size / chunks as u64;
    let mut reader = BufReader::with_capacity(PROBE_BUFFER_CAPACITY, file);
    let mut ranges = Vec::with_capacity(chunks);
    let mut start = 0;

    for i in 0..chunks {
        let end = if i == chunks - 1 {
            size
        } else {
            seek_line_end(&mut reader, start + median, size)
                .map_err(|e| SearchError::read_error(path, e))?
        };
        trace!("Planned range [{}, {}) of {}", start, end, path.display());
        ranges.push(ByteRange::new(start, end));
        start = end;
    }

    debug!(
        "Split {} ({} bytes) into {} ranges",
        path.display(),
        size,
        ranges.len()
    );
    Ok(ranges)
}

/// Returns the offset just past the first `\n` at or after `from`, or `size`
/// when there is none.
fn seek_line_end<R: BufRead + Seek>(reader: &mut R, from: u64, size: u64) -> io::Result<u64> {
    if from >= size {
        return Ok(size);
    }
    reader.seek(SeekFrom::Start(from))?;
    let mut pos = from;
    loop {
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            return Ok(size);
        }
        if let Some(offset) = buf.iter().position(|&b| b == b'\n') {
            return Ok((pos + offset as u64 + 1).min(size));
        }
        let consumed = buf.len();
        pos += consumed as u64;
        reader.consume(consumed);
    }
}
