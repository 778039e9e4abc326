use std::fmt::Write;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use indicatif::HumanBytes;
use recache_disk::{DiskCache, Usage};
use recache_fetch::{CacheKey, Downloader, ReqwestClient};

use crate::env::Settings;

#[derive(Args, Clone, Debug)]
pub struct KeyArg {
    #[arg(help = "URL to derive the key of")]
    pub url: String,
}

pub fn key(arg: KeyArg) -> Result<ExitCode> {
    println!("{}", CacheKey::derive(arg.url.trim()));
    Ok(ExitCode::SUCCESS)
}

pub async fn clear(settings: &Settings) -> Result<ExitCode> {
    let client = ReqwestClient::new(settings.client.clone())?;
    let downloader = Downloader::open(client, settings.downloader_config())
        .with_context(|| format!("Failed to open cache at {}", settings.cache_dir.display()))?;
    downloader.clear_cache().await.context("Failed to clear cache")?;
    eprintln!("cleared {}", settings.cache_dir.display());
    Ok(ExitCode::SUCCESS)
}

/// Reports what the journal records. Never opens the cache, so nothing is
/// purged, trimmed or rewritten.
pub fn info(settings: &Settings) -> Result<ExitCode> {
    let usage = DiskCache::usage(&settings.cache_dir, settings.cache_version);
    print!("{}", describe(settings, &usage));
    Ok(ExitCode::SUCCESS)
}

fn describe(settings: &Settings, usage: &Usage) -> String {
    let (entries, size) = match usage {
        Usage::Recorded { entries, size, .. } => (*entries, *size),
        Usage::Empty | Usage::Stale(_) => (0, 0),
    };

    let mut out = String::new();
    let _ = writeln!(out, "directory: {}", settings.cache_dir.display());
    let _ = writeln!(out, "version:   {}", settings.cache_version);
    match usage {
        Usage::Empty => {
            let _ = writeln!(out, "state:     empty");
        }
        Usage::Stale(reason) => {
            let _ = writeln!(out, "state:     stale ({reason}), entries are dropped on next use");
        }
        Usage::Recorded { .. } => {}
    }
    let _ = writeln!(out, "entries:   {entries}");
    let _ = writeln!(out, "size:      {} / {}", HumanBytes(size), HumanBytes(settings.max_size));
    out
}
