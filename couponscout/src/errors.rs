//! Error types for couponscout.
//!
//! Every fallible operation in the crate returns [`SearchResult`]. Errors that
//! belong to one coupon file (a missing file, a failed chunk read) are tagged
//! with the file's path so that the aggregate verdict can report exactly which
//! files could not be scanned:
//!
//! ```rust,ignore
//! match handle.evaluate() {
//!     Ok(true) => // coupon accepted,
//!     Ok(false) => // coupon rejected,
//!     Err(SearchError::Files(failures)) => // some files could not be scanned,
//!     Err(e) => // configuration or protocol error
//! }
//! ```

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for search operations
pub type SearchResult<T> = Result<T, SearchError>;

/// Errors that can occur during search operations
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("Failed to read {path}: {source}")]
    ReadError { path: PathBuf, source: io::Error },
    #[error("Invalid coupon code: length {len} is outside {min}..={max}")]
    InvalidToken { len: usize, min: usize, max: usize },
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Search result already retrieved")]
    AlreadyConsumed,
    #[error("Worker pool error: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
    #[error("{} coupon file(s) could not be searched: {}", .0.len(), FileErrors(.0))]
    Files(Vec<FileError>),
}

/// A failure that prevented one coupon file from being fully scanned.
#[derive(Debug)]
pub struct FileError {
    pub path: PathBuf,
    pub error: SearchError,
}

impl fmt::Display for FileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.error)
    }
}

struct FileErrors<'a>(&'a [FileError]);

impl fmt::Display for FileErrors<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", failure)?;
        }
        Ok(())
    }
}

impl SearchError {
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound(path.into())
    }

    pub fn permission_denied(path: impl Into<PathBuf>) -> Self {
        Self::PermissionDenied(path.into())
    }

    pub fn read_error(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::ReadError {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_token(len: usize, min: usize, max: usize) -> Self {
        Self::InvalidToken { len, min, max }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Maps an error from opening or inspecting `path` onto the most specific variant.
    pub fn from_io(path: &Path, e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => Self::file_not_found(path),
            io::ErrorKind::PermissionDenied => Self::permission_denied(path),
            _ => Self::read_error(path, e),
        }
    }
}
