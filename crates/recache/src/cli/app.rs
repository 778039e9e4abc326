use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use super::cache::KeyArg;
use super::get::GetArg;

#[derive(Clone, Debug, Parser)]
#[command(name = "recache", version = env!("CARGO_PKG_VERSION"), about, long_about = None, propagate_version = true)]
pub struct App {
    #[command(flatten)]
    pub global: GlobalArgs,
    #[command(subcommand)]
    pub cmd:    Commands,
}

#[derive(Clone, Debug, Args)]
pub struct GlobalArgs {
    #[arg(long, global = true, value_name = "DIR", help = "Cache directory")]
    pub cache_dir:     Option<PathBuf>,
    #[arg(long, global = true, value_name = "BYTES", help = "Upper bound of the cache size")]
    pub max_size:      Option<u64>,
    #[arg(long, global = true, value_name = "N", help = "Cache format version; changing it drops all entries")]
    pub cache_version: Option<u32>,
    #[arg(long, global = true, value_name = "FILE", help = "Config file [default: ~/.recache/config.toml]")]
    pub config:        Option<PathBuf>,
    #[arg(short, long, global = true, action = ArgAction::Count, help = "More logging, repeat for more")]
    pub verbose:       u8,
}

#[derive(Clone, Debug, Subcommand)]
pub enum Commands {
    #[command(alias = "g", name = "get", about = "Download a URL through the cache and print its path")]
    Get(GetArg),
    #[command(alias = "k", name = "key", about = "Print the cache key of a URL")]
    Key(KeyArg),
    #[command(alias = "c", name = "clear", about = "Remove every cache entry and staging file")]
    Clear,
    #[command(alias = "i", name = "info", about = "Show cache location and usage")]
    Info,
}
