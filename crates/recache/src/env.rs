use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use anyhow::{Context, Result};
use home::home_dir;
use recache_fetch::data::options::{DEFAULT_BUFFER_SIZE, DEFAULT_CACHE_VERSION, DEFAULT_MAX_SIZE};
use recache_fetch::{ClientConfig, DownloaderConfig, Timeouts};
use serde::Deserialize;

use crate::cli::app::GlobalArgs;

pub const DEFAULT_RETRIES: u32 = 3;
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(500);

const CONFIG_FILE: &str = "config.toml";

/// Optional settings read from `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub cache_dir:     Option<PathBuf>,
    pub max_size:      Option<u64>,
    pub cache_version: Option<u32>,
    pub buffer_size:   Option<usize>,
    pub pacing_ms:     Option<u64>,
    pub retries:       Option<u32>,
    pub backoff_ms:    Option<u64>,
    pub client:        FileClientConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileClientConfig {
    pub connect_timeout_secs: Option<u64>,
    pub read_timeout_secs:    Option<u64>,
    pub proxies:              Vec<String>,
    pub user_agent:           Option<String>,
}

impl FileConfig {
    pub fn parse(text: &str) -> Result<Self> { toml::from_str(text).context("Invalid config file") }

    /// A missing file is only an error when `required`.
    pub fn load(path: &Path, required: bool) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => Self::parse(&text).with_context(|| format!("Failed to load {}", path.display())),
            Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }
}

/// Resolved settings: flags over config file over defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub cache_dir:     PathBuf,
    pub max_size:      u64,
    pub cache_version: u32,
    pub buffer_size:   usize,
    pub pacing:        Option<Duration>,
    pub retries:       u32,
    pub backoff:       Duration,
    pub client:        ClientConfig,
}

impl Settings {
    pub fn resolve(global: &GlobalArgs) -> Result<Self> {
        let root = root_dir()?;
        let file = match &global.config {
            Some(path) => FileConfig::load(path, true)?,
            None => FileConfig::load(&root.join(CONFIG_FILE), false)?,
        };
        Ok(Self::merge(&root, file, global))
    }

    fn merge(root: &Path, file: FileConfig, global: &GlobalArgs) -> Self {
        let defaults = Timeouts::default();
        let timeouts = Timeouts {
            connect: file.client.connect_timeout_secs.map_or(defaults.connect, Duration::from_secs),
            read:    file.client.read_timeout_secs.map_or(defaults.read, Duration::from_secs),
        };

        Self {
            cache_dir:     global
                .cache_dir
                .clone()
                .or(file.cache_dir)
                .unwrap_or_else(|| DownloaderConfig::in_parent(root).cache_dir),
            max_size:      global.max_size.or(file.max_size).unwrap_or(DEFAULT_MAX_SIZE),
            cache_version: global.cache_version.or(file.cache_version).unwrap_or(DEFAULT_CACHE_VERSION),
            buffer_size:   file.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE),
            pacing:        file.pacing_ms.map(Duration::from_millis),
            retries:       file.retries.unwrap_or(DEFAULT_RETRIES),
            backoff:       file.backoff_ms.map_or(DEFAULT_BACKOFF, Duration::from_millis),
            client:        ClientConfig {
                timeouts,
                proxies: file.client.proxies,
                user_agent: file
                    .client
                    .user_agent
                    .or_else(|| Some(format!("recache/{}", env!("CARGO_PKG_VERSION")))),
            },
        }
    }

    pub fn downloader_config(&self) -> DownloaderConfig {
        DownloaderConfig::new(&self.cache_dir)
            .max_size(self.max_size)
            .version(self.cache_version)
            .buffer_size(self.buffer_size)
            .pacing(self.pacing)
    }
}

/// `$RECACHE_ROOT`, or `~/.recache`.
pub fn root_dir() -> Result<PathBuf> {
    if let Ok(root) = env::var("RECACHE_ROOT") {
        return Ok(PathBuf::from(root));
    }
    let home = home_dir().context("Failed to get home directory")?;
    Ok(home.join(".recache"))
}
