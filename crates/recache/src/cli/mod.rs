pub mod app;
pub mod cache;
pub mod get;

use std::process::ExitCode;

use anyhow::Result;

use crate::env::Settings;
use app::{App, Commands};

pub async fn run(app: App) -> Result<ExitCode> {
    let settings = Settings::resolve(&app.global)?;
    tracing::debug!(?settings, "resolved settings");

    match app.cmd {
        Commands::Get(arg) => get::get(arg, &settings).await,
        Commands::Key(arg) => cache::key(arg),
        Commands::Clear => cache::clear(&settings).await,
        Commands::Info => cache::info(&settings),
    }
}
