use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::io_at;
use crate::journal::{JOURNAL_FILE, Journal, JournalEntry, Loaded};
use crate::{Error, Result};

const ENTRY_SUFFIX: &str = ".0";
const EDIT_SUFFIX: &str = ".0.tmp";
const MAX_KEY_LEN: usize = 120;

/// The transactional key-value contract the download pipeline relies on.
///
/// - `get` never fails for a missing key; it returns `Ok(None)`.
/// - `begin_edit` returns `Ok(None)` while another editor holds the key.
/// - A committed value becomes visible to `get` atomically; an aborted one never does.
pub trait BlobCache: Clone + Send + Sync + 'static {
    type Editor: BlobEditor;

    fn get(&self, key: &str) -> Result<Option<Snapshot>>;

    fn begin_edit(&self, key: &str) -> Result<Option<Self::Editor>>;

    /// Durably persists the bookkeeping.
    fn flush(&self) -> Result<()>;

    /// Removes the whole cache directory, including files the cache did not create.
    fn delete(&self) -> Result<()>;
}

pub trait BlobEditor: Send + 'static {
    /// Writable stream for value slot `index`. Only slot 0 exists.
    fn output(&mut self, index: usize) -> Result<&mut File>;

    fn commit(self) -> Result<()>;

    fn abort(self);
}

/// A committed entry, as seen by a reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    key:  String,
    path: PathBuf,
    size: u64,
}

impl Snapshot {
    pub fn key(&self) -> &str { &self.key }

    pub fn path(&self) -> &Path { &self.path }

    pub fn into_path(self) -> PathBuf { self.path }

    pub fn size(&self) -> u64 { self.size }
}

/// The state of a cache directory as recorded by its journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Usage {
    /// No journal has been written yet.
    Empty,
    Recorded { entries: usize, size: u64, max_size: u64 },
    /// The journal is unreadable or from another app version. Opening the
    /// cache will discard its entries.
    Stale(String),
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    size: u64,
    used: u64,
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<String, Slot>,
    editing: HashSet<String>,
    size:    u64,
    clock:   u64,
}

impl State {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn insert(&mut self, key: &str, size: u64) {
        let used = self.tick();
        if let Some(old) = self.entries.insert(key.to_string(), Slot { size, used }) {
            self.size -= old.size;
        }
        self.size += size;
    }

    fn touch(&mut self, key: &str) {
        let used = self.tick();
        if let Some(slot) = self.entries.get_mut(key) {
            slot.used = used;
        }
    }

    fn remove(&mut self, key: &str) -> Option<u64> {
        let slot = self.entries.remove(key)?;
        self.size -= slot.size;
        Some(slot.size)
    }

    fn lru_victim(&self) -> Option<String> {
        self.entries
            .iter()
            .filter(|(key, _)| !self.editing.contains(*key))
            .min_by_key(|(_, slot)| slot.used)
            .map(|(key, _)| key.clone())
    }

    fn ordered(&self) -> Vec<JournalEntry> {
        let mut entries: Vec<_> = self.entries.iter().collect();
        entries.sort_by_key(|(_, slot)| slot.used);
        entries
            .into_iter()
            .map(|(key, slot)| JournalEntry {
                key:  key.clone(),
                size: slot.size,
            })
            .collect()
    }
}

#[derive(Debug)]
struct Inner {
    dir:         PathBuf,
    app_version: u32,
    max_size:    u64,
    state:       Mutex<State>,
}

impl Inner {
    fn entry_path(&self, key: &str) -> PathBuf { self.dir.join(format!("{key}{ENTRY_SUFFIX}")) }

    fn edit_path(&self, key: &str) -> PathBuf { self.dir.join(format!("{key}{EDIT_SUFFIX}")) }

    fn journal_path(&self) -> PathBuf { self.dir.join(JOURNAL_FILE) }

    /// Evicts least recently used entries until the total fits `max_size`.
    fn trim(&self, state: &mut State) {
        while state.size > self.max_size {
            let Some(victim) = state.lru_victim() else {
                break;
            };
            let freed = state.remove(&victim).unwrap_or_default();
            match fs::remove_file(self.entry_path(&victim)) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(key = %victim, error = %e, "failed to remove evicted entry"),
            }
            debug!(key = %victim, freed, total = state.size, "evicted cache entry");
        }
    }

    fn write_journal(&self, state: &State) -> Result<()> {
        Journal::new(self.app_version, self.max_size, state.ordered()).store(&self.journal_path())
    }
}

/// Journaled LRU cache bounded by the total size of its entries.
///
/// Cloning yields another handle to the same cache.
#[derive(Debug, Clone)]
pub struct DiskCache {
    inner: Arc<Inner>,
}

impl DiskCache {
    /// Opens or creates the cache in `dir`.
    ///
    /// Entries recorded under a different `app_version`, or under an unreadable
    /// journal, are deleted.
    pub fn open(dir: impl Into<PathBuf>, app_version: u32, max_size: u64) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(io_at(&dir))?;

        let inner = Inner {
            dir,
            app_version,
            max_size,
            state: Mutex::new(State::default()),
        };

        {
            let mut state = inner.state.lock();
            match Journal::load(&inner.journal_path(), app_version) {
                Loaded::Valid(journal) => {
                    for entry in journal.entries {
                        if !is_valid_key(&entry.key) {
                            continue;
                        }
                        // the file is the source of truth for the size
                        if let Ok(meta) = fs::metadata(inner.entry_path(&entry.key)) {
                            state.insert(&entry.key, meta.len());
                        }
                    }
                }
                Loaded::Missing => {}
                Loaded::Rejected(reason) => {
                    warn!(dir = %inner.dir.display(), %reason, "discarding cache entries");
                    purge_entries(&inner.dir)?;
                }
            }

            adopt_orphans(&inner, &mut state)?;
            inner.trim(&mut state);
            inner.write_journal(&state)?;

            debug!(
                dir = %inner.dir.display(),
                entries = state.entries.len(),
                size = state.size,
                max_size,
                "opened disk cache"
            );
        }

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn max_size(&self) -> u64 { self.inner.max_size }

    /// Total bytes of committed entries.
    pub fn size(&self) -> u64 { self.inner.state.lock().size }

    pub fn len(&self) -> usize { self.inner.state.lock().entries.len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Keys from least to most recently used.
    pub fn keys(&self) -> Vec<String> {
        self.inner
            .state
            .lock()
            .ordered()
            .into_iter()
            .map(|entry| entry.key)
            .collect()
    }

    /// Reads what the journal in `dir` records without touching the directory.
    ///
    /// Unlike [`DiskCache::open`] this never purges, trims or adopts, so entries
    /// committed after the last flush are not counted.
    pub fn usage(dir: impl AsRef<Path>, app_version: u32) -> Usage {
        match Journal::load(&dir.as_ref().join(JOURNAL_FILE), app_version) {
            Loaded::Missing => Usage::Empty,
            Loaded::Rejected(reason) => Usage::Stale(reason),
            Loaded::Valid(journal) => {
                let entries: Vec<_> = journal.entries.iter().filter(|e| is_valid_key(&e.key)).collect();
                Usage::Recorded {
                    entries:  entries.len(),
                    size:     entries.iter().map(|e| e.size).sum(),
                    max_size: journal.max_size,
                }
            }
        }
    }

    /// Removes one entry. Returns whether it existed. Entries under edit are kept.
    pub fn remove(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        let mut state = self.inner.state.lock();
        if state.editing.contains(key) || state.remove(key).is_none() {
            return Ok(false);
        }
        let path = self.inner.entry_path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(true),
            Err(e) => Err(io_at(path)(e)),
        }
    }
}

impl BlobCache for DiskCache {
    type Editor = Editor;

    fn get(&self, key: &str) -> Result<Option<Snapshot>> {
        validate_key(key)?;
        let mut state = self.inner.state.lock();
        let Some(slot) = state.entries.get(key).copied() else {
            return Ok(None);
        };

        let path = self.inner.entry_path(key);
        if !path.is_file() {
            warn!(key, "cache entry file vanished");
            state.remove(key);
            return Ok(None);
        }

        state.touch(key);
        Ok(Some(Snapshot {
            key: key.to_string(),
            path,
            size: slot.size,
        }))
    }

    fn begin_edit(&self, key: &str) -> Result<Option<Editor>> {
        validate_key(key)?;
        if !self.inner.state.lock().editing.insert(key.to_string()) {
            debug!(key, "cache key already under edit");
            return Ok(None);
        }

        let tmp = self.inner.edit_path(key);
        match File::create(&tmp) {
            Ok(file) => Ok(Some(Editor {
                inner: Arc::clone(&self.inner),
                key: key.to_string(),
                tmp,
                file: Some(file),
                finished: false,
            })),
            Err(e) => {
                self.inner.state.lock().editing.remove(key);
                Err(io_at(tmp)(e))
            }
        }
    }

    fn flush(&self) -> Result<()> {
        let state = self.inner.state.lock();
        self.inner.write_journal(&state)
    }

    fn delete(&self) -> Result<()> {
        let mut state = self.inner.state.lock();
        let dir = &self.inner.dir;
        match fs::remove_dir_all(dir) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(io_at(dir)(e)),
        }
        fs::create_dir_all(dir).map_err(io_at(dir))?;

        state.entries.clear();
        state.size = 0;
        debug!(dir = %dir.display(), "cache cleared");
        Ok(())
    }
}

/// An in-progress write of one entry. Dropping it without committing aborts.
#[derive(Debug)]
pub struct Editor {
    inner:    Arc<Inner>,
    key:      String,
    tmp:      PathBuf,
    file:     Option<File>,
    finished: bool,
}

impl Editor {
    pub fn key(&self) -> &str { &self.key }

    fn discard(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.file.take();
        let _ = fs::remove_file(&self.tmp);
        self.inner.state.lock().editing.remove(&self.key);
    }

    fn publish(&mut self) -> Result<u64> {
        if let Some(mut file) = self.file.take() {
            file.flush().map_err(io_at(&self.tmp))?;
            file.sync_all().map_err(io_at(&self.tmp))?;
        }

        let path = self.inner.entry_path(&self.key);
        recache_fs::rename_replace(&self.tmp, &path)?;
        let size = fs::metadata(&path).map_err(io_at(&path))?.len();
        Ok(size)
    }
}

impl BlobEditor for Editor {
    fn output(&mut self, index: usize) -> Result<&mut File> {
        if index != 0 {
            return Err(Error::InvalidIndex(index));
        }
        let tmp = &self.tmp;
        self.file.as_mut().ok_or_else(|| Error::Io {
            path:   tmp.clone(),
            source: std::io::Error::other("editor already closed"),
        })
    }

    fn commit(mut self) -> Result<()> {
        let size = match self.publish() {
            Ok(size) => size,
            Err(e) => {
                self.discard();
                return Err(e);
            }
        };
        self.finished = true;

        let mut state = self.inner.state.lock();
        state.editing.remove(&self.key);
        state.insert(&self.key, size);
        debug!(key = %self.key, size, total = state.size, "committed cache entry");
        self.inner.trim(&mut state);
        Ok(())
    }

    fn abort(mut self) { self.discard(); }
}

impl Drop for Editor {
    fn drop(&mut self) { self.discard(); }
}

fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && key
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-')
}

fn validate_key(key: &str) -> Result<()> {
    if is_valid_key(key) {
        Ok(())
    } else {
        Err(Error::InvalidKey(key.to_string()))
    }
}

/// Deletes every entry and leftover edit file, plus the journal.
fn purge_entries(dir: &Path) -> Result<()> {
    for entry in fs::read_dir(dir).map_err(io_at(dir))? {
        let entry = entry.map_err(io_at(dir))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let owned = name == JOURNAL_FILE
            || recache_fs::is_atomic_temp(name)
            || name.strip_suffix(EDIT_SUFFIX).is_some_and(is_valid_key)
            || name.strip_suffix(ENTRY_SUFFIX).is_some_and(is_valid_key);
        if owned {
            recache_fs::primitives::remove_if_exists(entry.path())?;
        }
    }
    Ok(())
}

/// Removes abandoned edits and journal writes, and picks up entries committed
/// after the last flush.
fn adopt_orphans(inner: &Inner, state: &mut State) -> Result<()> {
    for entry in fs::read_dir(&inner.dir).map_err(io_at(&inner.dir))? {
        let entry = entry.map_err(io_at(&inner.dir))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };

        if name.strip_suffix(EDIT_SUFFIX).is_some_and(is_valid_key) || recache_fs::is_atomic_temp(name) {
            recache_fs::primitives::remove_if_exists(entry.path())?;
            continue;
        }

        if let Some(key) = name.strip_suffix(ENTRY_SUFFIX).filter(|key| is_valid_key(key))
            && !state.entries.contains_key(key)
        {
            let size = entry.metadata().map_err(io_at(entry.path()))?.len();
            debug!(key, size, "adopted unjournaled cache entry");
            state.insert(key, size);
        }
    }
    Ok(())
}
