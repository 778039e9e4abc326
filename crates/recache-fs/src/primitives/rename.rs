use crate::{Error, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// Renames `from` to `to`, replacing `to` if it already exists.
///
/// Both paths must live on the same filesystem. On Unix `rename(2)` replaces the
/// destination atomically; elsewhere the destination is removed first.
pub fn rename_replace(from: impl AsRef<Path>, to: impl AsRef<Path>) -> Result<()> {
    let from = from.as_ref();
    let to = to.as_ref();

    #[cfg(not(unix))]
    remove_if_exists(to)?;

    fs::rename(from, to).map_err(|source| Error::Rename {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    })
}

/// Removes a file, treating a missing file as success. Returns whether a file was removed.
pub fn remove_if_exists(path: impl AsRef<Path>) -> Result<bool> {
    let path = path.as_ref();
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(source) => Err(Error::Remove {
            path: path.to_path_buf(),
            source,
        }),
    }
}
