//! This module implements the concurrent coupon search.
//!
//! # Pipeline
//!
//! For every configured file the search runs a small producer/consumer
//! pipeline on a dedicated worker pool:
//!
//! ```text
//!                      ┌─ reader 0 ─┐                 ┌─ scanner ─┐
//! planner ── ranges ──▶├─ reader 1 ─┼─▶ bounded queue ─┼─ scanner ─┼─▶ FileEvent
//!                      └─ reader 2 ─┘                  └─ scanner ─┘
//! ```
//!
//! 1. **Planning**: [`planner::plan_chunks`] splits the file into line-aligned
//!    byte ranges, one per reader.
//! 2. **Reading**: each reader opens its own handle, reads its range and
//!    pushes lines onto the file's bounded queue, checking the cancellation
//!    token before every push. A full queue blocks the reader.
//! 3. **Scanning**: scanners compare lines to the coupon by exact equality and
//!    flip the file's match flag. Once the flag is set they all stop, the queue
//!    disconnects and the remaining readers bail out.
//! 4. **Aggregation**: [`aggregator::Aggregator`] counts distinct matched files
//!    from the event stream and decides as soon as the threshold is met, every
//!    file is finished, or the search is cancelled.
//!
//! # Usage
//!
//! ```rust,ignore
//! let engine = SearchEngine::new(SearchConfig::load()?)?;
//! let mut handle = engine.search("HAPPYHRS", &request_token)?;
//! if handle.evaluate()? {
//!     // coupon accepted
//! }
//! ```

pub mod aggregator;
pub mod engine;
pub mod file_search;
pub mod orchestrator;
pub mod planner;
pub mod reader;
pub mod scanner;

pub use aggregator::{Decision, Verdict};
pub use engine::SearchEngine;
pub use file_search::{FileSearchSettings, FileState};
pub use orchestrator::{start_search, SearchHandle, SearchTarget};
pub use planner::{plan_chunks, ByteRange};
