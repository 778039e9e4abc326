use std::fmt;

use sha2::{Digest, Sha256};

/// Filesystem-safe identifier of a URL: the lowercase hex SHA-256 of its bytes.
///
/// Used both as the [`BlobCache`](recache_disk::BlobCache) key and as the stem
/// of the staging files, so it never contains anything but `[0-9a-f]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Length of every key, in characters.
    pub const LEN: usize = 64;

    /// ```
    /// use recache_fetch::CacheKey;
    ///
    /// let key = CacheKey::derive("https://example.com/a.bin");
    /// assert_eq!(key, CacheKey::derive("https://example.com/a.bin"));
    /// assert_eq!(key.as_str().len(), CacheKey::LEN);
    /// ```
    pub fn derive(url: &str) -> Self { Self(hex::encode(Sha256::digest(url.as_bytes()))) }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str { &self.0 }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}
