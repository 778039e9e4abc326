//! Error types for recache-fetch.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected HTTP status {0}")]
    UnexpectedStatus(u16),

    #[error("invalid Content-Range header: {0:?}")]
    InvalidContentRange(String),

    #[error("server resumed at byte {actual}, expected {expected}")]
    RangeMismatch { expected: u64, actual: u64 },

    #[error("body ended after {actual} of {expected} bytes")]
    Incomplete { expected: u64, actual: u64 },

    #[error("download cancelled after {0} bytes")]
    Cancelled(u64),

    #[error("cache entry is being written by another editor")]
    CacheContention,

    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("background task failed: {0}")]
    Task(String),

    #[error("file I/O error: {0}")]
    Filesystem(#[from] recache_fs::Error),

    #[error("cache error: {0}")]
    Cache(#[from] recache_disk::Error),
}

pub type Result<T> = std::result::Result<T, FetchError>;

impl FetchError {
    pub(crate) fn transport<E: std::error::Error>(e: E) -> Self { FetchError::Transport(e.to_string()) }

    /// `true` for failures that leave resumable progress behind and may succeed on a later call.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::InvalidInput(_) | FetchError::Client(_))
    }
}
