//! On-disk bookkeeping of the cache.
//!
//! The journal is a single JSON document replaced atomically on every flush.
//! Entries are stored least recently used first.

use std::io::ErrorKind;
use std::path::Path;

use recache_fs::{AtomicWriteOptions, atomic_read, atomic_write};
use serde::{Deserialize, Serialize};

use crate::Result;

pub(crate) const JOURNAL_FILE: &str = "journal";

const MAGIC: &str = "recache.journal";
const FORMAT: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Journal {
    magic:           String,
    format:          u32,
    pub app_version: u32,
    pub max_size:    u64,
    pub entries:     Vec<JournalEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct JournalEntry {
    pub key:  String,
    pub size: u64,
}

#[derive(Debug)]
pub(crate) enum Loaded {
    Missing,
    Valid(Journal),
    /// Unreadable, foreign or written for another app version.
    Rejected(String),
}

impl Journal {
    pub fn new(app_version: u32, max_size: u64, entries: Vec<JournalEntry>) -> Self {
        Self {
            magic: MAGIC.to_string(),
            format: FORMAT,
            app_version,
            max_size,
            entries,
        }
    }

    pub fn load(path: &Path, app_version: u32) -> Loaded {
        let bytes = match atomic_read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.io_kind() == Some(ErrorKind::NotFound) => return Loaded::Missing,
            Err(e) => return Loaded::Rejected(e.to_string()),
        };

        match serde_json::from_slice::<Journal>(&bytes) {
            Err(e) => Loaded::Rejected(format!("corrupt journal: {e}")),
            Ok(journal) if journal.magic != MAGIC || journal.format != FORMAT => {
                Loaded::Rejected(format!(
                    "unknown journal format {:?}/{}",
                    journal.magic, journal.format
                ))
            }
            Ok(journal) if journal.app_version != app_version => Loaded::Rejected(format!(
                "app version changed from {} to {}",
                journal.app_version, app_version
            )),
            Ok(journal) => Loaded::Valid(journal),
        }
    }

    pub fn store(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self)?;
        atomic_write(path, &bytes, AtomicWriteOptions::new().sync(true))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn entry(key: &str, size: u64) -> JournalEntry {
        JournalEntry {
            key: key.to_string(),
            size,
        }
    }

    #[test]
    fn test_store_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(JOURNAL_FILE);
        Journal::new(3, 1024, vec![entry("a", 1), entry("b", 2)])
            .store(&path)
            .unwrap();

        match Journal::load(&path, 3) {
            Loaded::Valid(journal) => {
                assert_eq!(journal.max_size, 1024);
                assert_eq!(journal.entries, vec![entry("a", 1), entry("b", 2)]);
            }
            other => panic!("expected valid journal, got {other:?}"),
        }
    }

    #[test]
    fn test_version_change_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(JOURNAL_FILE);
        Journal::new(1, 1024, vec![]).store(&path).unwrap();

        assert!(matches!(Journal::load(&path, 2), Loaded::Rejected(_)));
    }

    #[test]
    fn test_missing_and_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(JOURNAL_FILE);
        assert!(matches!(Journal::load(&path, 1), Loaded::Missing));

        fs::write(&path, b"{ not json").unwrap();
        assert!(matches!(Journal::load(&path, 1), Loaded::Rejected(_)));
    }
}
