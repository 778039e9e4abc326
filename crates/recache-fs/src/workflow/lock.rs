use crate::primitives::remove_if_exists;
use crate::{Error, Result};
use fs2::FileExt;
use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// An exclusive advisory lock on a lock file, released on drop.
///
/// Serializes work on one cache key between processes. Within a process the
/// caller is expected to serialize as well: the lock is tied to the open file
/// description, not to a thread.
#[derive(Debug)]
pub struct KeyLock {
    file: File,
    path: PathBuf,
}

impl KeyLock {
    fn open(path: &Path) -> Result<File> {
        File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|source| Error::Write {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Blocks until the lock is held.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        loop {
            let file = Self::open(path)?;
            file.lock_exclusive().map_err(|source| Error::Lock {
                path: path.to_path_buf(),
                source,
            })?;
            // the previous holder unlinked the file while we waited
            if !still_linked(&file, path) {
                continue;
            }
            tracing::trace!(path = %path.display(), "key lock acquired");

            return Ok(Self {
                file,
                path: path.to_path_buf(),
            });
        }
    }

    /// Returns `Ok(None)` when another holder has the lock.
    pub fn try_acquire(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        loop {
            let file = Self::open(path)?;
            match file.try_lock_exclusive() {
                Ok(()) if !still_linked(&file, path) => continue,
                Ok(()) => {
                    return Ok(Some(Self {
                        file,
                        path: path.to_path_buf(),
                    }));
                }
                Err(e)
                    if e.kind() == ErrorKind::WouldBlock
                        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error() =>
                {
                    return Ok(None);
                }
                Err(source) => {
                    return Err(Error::Lock {
                        path: path.to_path_buf(),
                        source,
                    });
                }
            }
        }
    }

    pub fn path(&self) -> &Path { &self.path }

    /// Unlinks the lock file while still holding it, then releases the lock.
    ///
    /// Waiters blocked on the old file notice it is gone and lock a fresh one.
    pub fn remove(self) -> Result<()> {
        remove_if_exists(&self.path)?;
        Ok(())
    }
}

#[cfg(unix)]
fn still_linked(file: &File, path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    match (file.metadata(), fs::metadata(path)) {
        (Ok(held), Ok(current)) => held.dev() == current.dev() && held.ino() == current.ino(),
        _ => false,
    }
}

// Windows refuses to delete a file that is open, so the path never goes stale.
#[cfg(not(unix))]
fn still_linked(_file: &File, path: &Path) -> bool { path.exists() }

impl Drop for KeyLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
