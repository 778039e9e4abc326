use std::path::{Path, PathBuf};
use std::time::Duration;

const KB: usize = 1024;
const MB: u64 = 1024 * 1024;

/// Default upper bound of the cache: 200 MiB.
pub const DEFAULT_MAX_SIZE: u64 = 200 * MB;

pub const DEFAULT_CACHE_VERSION: u32 = 1;

/// Granularity of cancellation checks and progress notifications.
pub const DEFAULT_BUFFER_SIZE: usize = 8 * KB;

/// Directory name used by callers that only know a parent directory.
pub const DEFAULT_CACHE_DIR_NAME: &str = "__file_cache_dir__";

/// Configuration of a [`Downloader`](crate::Downloader), built once by the caller.
///
/// # Examples
///
/// ```
/// use recache_fetch::DownloaderConfig;
/// use std::time::Duration;
///
/// let config = DownloaderConfig::new("/tmp/recache")
///     .max_size(50 * 1024 * 1024)
///     .version(2)
///     .pacing(Some(Duration::from_millis(20)));
/// assert_eq!(config.version, 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloaderConfig {
    /// Directory holding cache entries, the journal and staging files.
    pub cache_dir: PathBuf,

    /// Upper bound of the total size of cache entries, in bytes.
    ///
    /// Staging files do not count towards it.
    ///
    /// Default: 200 MiB
    pub max_size: u64,

    /// Cache format version. Changing it discards every existing entry.
    ///
    /// Default: 1
    pub version: u32,

    /// Bytes written between two cancellation checks.
    ///
    /// Default: 8 KiB
    pub buffer_size: usize,

    /// Artificial delay after each buffer, for throttling.
    ///
    /// Default: None
    pub pacing: Option<Duration>,
}

impl DownloaderConfig {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir:   cache_dir.into(),
            max_size:    DEFAULT_MAX_SIZE,
            version:     DEFAULT_CACHE_VERSION,
            buffer_size: DEFAULT_BUFFER_SIZE,
            pacing:      None,
        }
    }

    /// Uses `<parent>/__file_cache_dir__` as the cache directory.
    pub fn in_parent(parent: impl AsRef<Path>) -> Self {
        Self::new(parent.as_ref().join(DEFAULT_CACHE_DIR_NAME))
    }

    #[must_use]
    pub fn max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    #[must_use]
    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Zero is bumped to one byte.
    #[must_use]
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }

    #[must_use]
    pub fn pacing(mut self, pacing: Option<Duration>) -> Self {
        self.pacing = pacing.filter(|delay| !delay.is_zero());
        self
    }
}

/// Transport timeouts. The download core imposes no deadline of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,

    /// Maximum idle time between two reads of the body.
    pub read: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            read:    Duration::from_secs(30),
        }
    }
}

/// Settings for [`ReqwestClient`](crate::ReqwestClient).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientConfig {
    pub timeouts:   Timeouts,
    /// Proxy URLs; `https://` ones proxy HTTPS traffic, the rest proxy HTTP.
    pub proxies:    Vec<String>,
    pub user_agent: Option<String>,
}

impl ClientConfig {
    #[must_use]
    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    #[must_use]
    pub fn proxy(mut self, url: impl Into<String>) -> Self {
        self.proxies.push(url.into());
        self
    }

    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}
