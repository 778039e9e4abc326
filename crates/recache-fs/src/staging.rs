//! Staging files of a single download.
//!
//! A download for `stem` moves through two files in the cache directory:
//!
//! - `<stem>_downloading` holds the bytes received so far; its length is the resume offset.
//! - `<stem>_done` holds a complete payload that has not been promoted yet.
//!
//! The rename from the first to the second is the commit point of a download.

use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::primitives::{remove_if_exists, rename_replace};
use crate::{Error, Result};

pub const DOWNLOADING_SUFFIX: &str = "_downloading";
pub const DONE_SUFFIX: &str = "_done";
pub const LOCK_SUFFIX: &str = "_lock";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagingState {
    /// Neither staging file exists.
    Empty,
    /// A partial download with the given number of bytes.
    Downloading(u64),
    /// A completed download waiting for promotion.
    Done,
}

#[derive(Debug, Clone)]
pub struct StagingFiles {
    downloading: PathBuf,
    done:        PathBuf,
    lock:        PathBuf,
}

impl StagingFiles {
    pub fn new(dir: impl AsRef<Path>, stem: &str) -> Self {
        let dir = dir.as_ref();
        Self {
            downloading: dir.join(format!("{stem}{DOWNLOADING_SUFFIX}")),
            done:        dir.join(format!("{stem}{DONE_SUFFIX}")),
            lock:        dir.join(format!("{stem}{LOCK_SUFFIX}")),
        }
    }

    pub fn downloading_path(&self) -> &Path { &self.downloading }

    pub fn done_path(&self) -> &Path { &self.done }

    pub fn lock_path(&self) -> &Path { &self.lock }

    /// Inspects the filesystem. A `done` file wins over a `downloading` one.
    pub fn state(&self) -> Result<StagingState> {
        if self.done.is_file() {
            return Ok(StagingState::Done);
        }
        match fs::metadata(&self.downloading) {
            Ok(meta) => Ok(StagingState::Downloading(meta.len())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(StagingState::Empty),
            Err(source) => Err(Error::Read {
                path: self.downloading.clone(),
                source,
            }),
        }
    }

    /// Length of the `downloading` file, creating it empty when absent.
    pub fn resume_offset(&self) -> Result<u64> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.downloading)
            .map_err(|source| Error::Write {
                path: self.downloading.clone(),
                source,
            })?;
        file.metadata()
            .map(|meta| meta.len())
            .map_err(|source| Error::Read {
                path: self.downloading.clone(),
                source,
            })
    }

    /// Drops every partial byte, leaving an empty `downloading` file.
    pub fn reset_downloading(&self) -> Result<()> {
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.downloading)
            .map(drop)
            .map_err(|source| Error::Write {
                path: self.downloading.clone(),
                source,
            })
    }

    /// Marks the download complete by renaming `downloading` over `done`.
    pub fn mark_done(&self) -> Result<&Path> {
        rename_replace(&self.downloading, &self.done)?;
        Ok(&self.done)
    }

    pub fn remove_done(&self) -> Result<bool> { remove_if_exists(&self.done) }
}
