use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use recache_disk::{BlobCache, BlobEditor, DiskCache};
use recache_fs::{KeyLock, StagingFiles, StagingState};
use tracing::{debug, warn};

use super::http::HttpClient;
use super::in_flight::InFlight;
use super::resumable::{self, Transfer};
use crate::core::CacheKey;
use crate::data::{Cancel, DownloaderConfig, ProgressSink};
use crate::error::{FetchError, Result};

/// Result of [`Downloader::fetch`].
#[derive(Debug)]
pub enum FetchOutcome {
    /// The payload is a committed cache entry.
    Cached(PathBuf),
    /// The payload is complete but could not be promoted; the path points at
    /// the `<key>_done` staging file, which a later fetch promotes again.
    Recovered(PathBuf),
    Failed(FetchError),
}

impl FetchOutcome {
    pub fn path(&self) -> Option<&Path> {
        match self {
            FetchOutcome::Cached(path) | FetchOutcome::Recovered(path) => Some(path),
            FetchOutcome::Failed(_) => None,
        }
    }

    pub fn is_cached(&self) -> bool { matches!(self, FetchOutcome::Cached(_)) }

    pub fn is_recovered(&self) -> bool { matches!(self, FetchOutcome::Recovered(_)) }

    pub fn is_failed(&self) -> bool { matches!(self, FetchOutcome::Failed(_)) }

    pub fn error(&self) -> Option<&FetchError> {
        match self {
            FetchOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// The payload path, or an empty string on failure.
    pub fn into_path_string(self) -> String {
        self.path()
            .map(|path| path.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn into_result(self) -> Result<PathBuf> {
        match self {
            FetchOutcome::Cached(path) | FetchOutcome::Recovered(path) => Ok(path),
            FetchOutcome::Failed(e) => Err(e),
        }
    }
}

/// Downloads URLs into a [`BlobCache`], resuming interrupted transfers.
///
/// Staging files (`<key>_downloading`, `<key>_done`, `<key>_lock`) live in
/// [`DownloaderConfig::cache_dir`], next to the cache entries. All three are
/// removed once the entry is cached.
///
/// Fetches of one key are serialized: inside the process by a per-key async
/// mutex, across processes by an advisory lock on `<key>_lock`. Distinct keys
/// proceed in parallel.
pub struct Downloader<C: HttpClient, B: BlobCache = DiskCache> {
    client:    C,
    cache:     B,
    config:    DownloaderConfig,
    in_flight: InFlight,
}

impl<C: HttpClient> Downloader<C, DiskCache> {
    /// Opens (or creates) the [`DiskCache`] described by `config`.
    pub fn open(client: C, config: DownloaderConfig) -> Result<Self> {
        let cache = DiskCache::open(&config.cache_dir, config.version, config.max_size)?;
        Ok(Self::with_cache(client, cache, config))
    }
}

impl<C: HttpClient, B: BlobCache> Downloader<C, B> {
    pub fn with_cache(client: C, cache: B, config: DownloaderConfig) -> Self {
        Self {
            client,
            cache,
            config,
            in_flight: InFlight::default(),
        }
    }

    pub fn cache(&self) -> &B { &self.cache }

    pub fn client(&self) -> &C { &self.client }

    pub fn config(&self) -> &DownloaderConfig { &self.config }

    /// Fetches `url`, serving it from the cache when possible.
    ///
    /// Never fails loudly: every error is reported as
    /// [`FetchOutcome::Failed`]. Staged bytes of a failed or cancelled
    /// transfer are kept and resumed by the next call for the same URL.
    ///
    /// `sink` is called inline after every buffer written to disk. No
    /// progress is reported for cache hits or for promotion of an already
    /// complete download.
    pub async fn fetch(&self, url: &str, sink: &dyn ProgressSink, cancel: &dyn Cancel) -> FetchOutcome {
        match self.run(url, sink, cancel).await {
            Ok(outcome) => outcome,
            Err(e @ FetchError::Cancelled(_)) => {
                debug!(url, error = %e, "fetch cancelled");
                FetchOutcome::Failed(e)
            }
            Err(e) => {
                warn!(url, error = %e, "fetch failed");
                FetchOutcome::Failed(e)
            }
        }
    }

    /// Removes every cache entry and staging file.
    ///
    /// Does not coordinate with fetches running at the same time.
    pub async fn clear_cache(&self) -> Result<()> {
        let cache = self.cache.clone();
        tokio::task::spawn_blocking(move || cache.delete())
            .await
            .map_err(|e| FetchError::Task(e.to_string()))??;
        debug!(dir = %self.config.cache_dir.display(), "cache cleared");
        Ok(())
    }

    async fn run(&self, url: &str, sink: &dyn ProgressSink, cancel: &dyn Cancel) -> Result<FetchOutcome> {
        let url = url.trim();
        if url.is_empty() {
            return Err(FetchError::InvalidInput("URL is empty".to_string()));
        }

        let key = CacheKey::derive(url);
        if let Some(path) = self.lookup(&key)? {
            return Ok(FetchOutcome::Cached(path));
        }

        let _in_flight = self.in_flight.enter(key.as_str()).await;
        let staging = StagingFiles::new(&self.config.cache_dir, key.as_str());
        let lock = self.lock(&staging).await?;

        let outcome = self.run_locked(url, &key, &staging, sink, cancel).await;
        // staging is empty once the entry is cached, so the lock file can go too
        if let Ok(FetchOutcome::Cached(_)) = &outcome
            && let Err(e) = lock.remove()
        {
            warn!(%key, error = %e, "failed to remove the lock file");
        }
        outcome
    }

    async fn run_locked(
        &self,
        url: &str,
        key: &CacheKey,
        staging: &StagingFiles,
        sink: &dyn ProgressSink,
        cancel: &dyn Cancel,
    ) -> Result<FetchOutcome> {
        // another fetch may have finished while we waited
        if let Some(path) = self.lookup(key)? {
            return Ok(FetchOutcome::Cached(path));
        }

        if staging.state()? == StagingState::Done {
            debug!(%key, "promoting completed download");
        } else {
            let transfer = Transfer {
                buffer_size: self.config.buffer_size.max(1),
                pacing:      self.config.pacing,
            };
            let size = resumable::download(&self.client, url, staging, transfer, sink, cancel).await?;
            staging.mark_done()?;
            debug!(%key, size, "download complete");
        }

        self.promote(key, staging).await
    }

    fn lookup(&self, key: &CacheKey) -> Result<Option<PathBuf>> {
        let hit = self.cache.get(key.as_str())?;
        if hit.is_some() {
            debug!(%key, "cache hit");
        }
        Ok(hit.map(|snapshot| snapshot.into_path()))
    }

    async fn lock(&self, staging: &StagingFiles) -> Result<KeyLock> {
        if let Some(lock) = KeyLock::try_acquire(staging.lock_path())? {
            return Ok(lock);
        }
        debug!(path = %staging.lock_path().display(), "waiting for another process");

        let path = staging.lock_path().to_path_buf();
        let lock = tokio::task::spawn_blocking(move || KeyLock::acquire(path))
            .await
            .map_err(|e| FetchError::Task(e.to_string()))??;
        Ok(lock)
    }

    async fn promote(&self, key: &CacheKey, staging: &StagingFiles) -> Result<FetchOutcome> {
        let cache = self.cache.clone();
        let entry_key = key.to_string();
        let done = staging.done_path().to_path_buf();

        let promoted = tokio::task::spawn_blocking(move || promote_blocking(&cache, &entry_key, &done))
            .await
            .map_err(|e| FetchError::Task(e.to_string()))?;

        match promoted {
            Ok(Some(path)) => {
                if let Err(e) = staging.remove_done() {
                    warn!(%key, error = %e, "promoted, but the staging file could not be removed");
                }
                Ok(FetchOutcome::Cached(path))
            }
            Ok(None) => {
                warn!(%key, "entry evicted right after commit, keeping the staging file");
                Ok(FetchOutcome::Recovered(absolute(staging.done_path())))
            }
            Err(e) => {
                warn!(%key, error = %e, "promotion failed, returning the staging file");
                Ok(FetchOutcome::Recovered(absolute(staging.done_path())))
            }
        }
    }
}

/// Copies the done file into a new entry. `None` if the entry did not
/// survive trimming.
fn promote_blocking<B: BlobCache>(cache: &B, key: &str, done: &Path) -> Result<Option<PathBuf>> {
    let mut editor = cache.begin_edit(key)?.ok_or(FetchError::CacheContention)?;

    if let Err(e) = copy_into(&mut editor, done) {
        editor.abort();
        return Err(e);
    }
    editor.commit()?;
    // the entry is published; a later flush or the next open records it
    if let Err(e) = cache.flush() {
        warn!(key, error = %e, "failed to flush the journal after commit");
    }

    Ok(cache.get(key)?.map(|snapshot| snapshot.into_path()))
}

fn copy_into<E: BlobEditor>(editor: &mut E, done: &Path) -> Result<u64> {
    let mut source = File::open(done).map_err(|source| recache_fs::Error::Read {
        path: done.to_path_buf(),
        source,
    })?;
    let output = editor.output(0)?;
    let copied = io::copy(&mut source, output).map_err(|source| recache_fs::Error::Write {
        path: done.to_path_buf(),
        source,
    })?;
    Ok(copied)
}

fn absolute(path: &Path) -> PathBuf { std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf()) }
