//! Resumable HTTP downloads promoted into a size-bounded on-disk cache.
//!
//! # Architecture
//!
//! The crate follows the three-layer pattern:
//! - [`data`] - configuration, progress values and cancellation
//! - [`core`] - pure transformations (cache keys, `Content-Range` parsing, backoff)
//! - [`effects`] - network and disk I/O behind the [`HttpClient`] trait
//!
//! # Download lifecycle
//!
//! A URL maps to a [`CacheKey`]. [`Downloader::fetch`] then walks
//! `<key>_downloading` → `<key>_done` → cache entry, and every step survives
//! process death:
//!
//! - a partial `<key>_downloading` is resumed with a `Range` request,
//! - a leftover `<key>_done` is promoted without touching the network,
//! - a committed cache entry short-circuits everything.
//!
//! Failures never escape [`Downloader::fetch`]; they come back as
//! [`FetchOutcome::Failed`].

pub mod core;
pub mod data;
pub mod effects;
mod error;

pub use self::core::{CacheKey, ContentRange, retry_delay};
pub use self::data::{
    Cancel, CancelToken, ChannelSink, ClientConfig, DownloadProgress, DownloaderConfig, NeverCancel,
    NoopSink, ProgressSink, Timeouts,
};
pub use self::effects::{BoxStream, Downloader, FetchOutcome, HttpClient, HttpResponse};

#[cfg(feature = "reqwest")]
pub use self::effects::ReqwestClient;

pub use self::error::{FetchError, Result};
