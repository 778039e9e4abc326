use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid cache key {0:?}: expected 1..=120 chars of [a-z0-9_-]")]
    InvalidKey(String),

    #[error("value index {0} out of range: this cache stores one value per key")]
    InvalidIndex(usize),

    #[error("cache I/O error at {path}: {source}")]
    Io {
        path:   PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Fs(#[from] recache_fs::Error),

    #[error("journal serialization error: {0}")]
    Journal(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

pub(crate) fn io_at(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Error {
    let path = path.into();
    move |source| Error::Io { path, source }
}
