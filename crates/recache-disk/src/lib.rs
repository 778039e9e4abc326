//! A size-bounded LRU blob cache on disk.
//!
//! Every entry is a single file `<key>.0` inside the cache directory. Writers go
//! through an [`Editor`] that stages bytes in `<key>.0.tmp` and publishes them
//! with a rename on [`Editor::commit`], so readers never see a partial entry.
//! Bookkeeping lives in a JSON `journal` written atomically by
//! [`DiskCache::flush`]; entry files committed after the last flush are adopted
//! again on [`DiskCache::open`].
//!
//! The directory may hold files the cache does not own (download staging files,
//! lock files). They are left alone except by [`DiskCache::delete`].

mod cache;
mod error;
mod journal;

pub use cache::{BlobCache, BlobEditor, DiskCache, Editor, Snapshot, Usage};
pub use error::{Error, Result};
