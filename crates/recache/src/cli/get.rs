use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::Args;
use recache_fetch::{
    CancelToken, ChannelSink, DownloadProgress, Downloader, FetchError, FetchOutcome, ReqwestClient, retry_delay,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

use crate::env::Settings;
use crate::ui::tracker::{ProgressTracker, ProgressTrackerBuilder, Tracker, TrackerBuilder};

const INTERRUPTED: u8 = 130;

#[derive(Args, Clone, Debug)]
pub struct GetArg {
    #[arg(help = "URL to download")]
    pub url:        String,
    #[arg(long, short, value_name = "N", help = "Retries after a failed attempt [default: 3]")]
    pub retries:    Option<u32>,
    #[arg(long, value_name = "MS", help = "Base delay between retries, doubled each time [default: 500]")]
    pub backoff_ms: Option<u64>,
    #[arg(long, value_name = "MS", help = "Delay after each written buffer")]
    pub pacing_ms:  Option<u64>,
    #[arg(long, short, help = "Do not draw a progress bar")]
    pub quiet:      bool,
}

pub async fn get(arg: GetArg, settings: &Settings) -> Result<ExitCode> {
    let mut config = settings.downloader_config();
    if let Some(ms) = arg.pacing_ms {
        config = config.pacing(Some(Duration::from_millis(ms)));
    }
    let retries = arg.retries.unwrap_or(settings.retries);
    let backoff = arg.backoff_ms.map_or(settings.backoff, Duration::from_millis);

    let client = ReqwestClient::new(settings.client.clone())?;
    let downloader = Downloader::open(client, config)
        .with_context(|| format!("Failed to open cache at {}", settings.cache_dir.display()))?;

    let cancel = CancelToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let mut attempt = 0;
    loop {
        let (sink, rx) = ChannelSink::new();
        let render = tokio::spawn(render(rx, arg.quiet));
        let outcome = downloader.fetch(&arg.url, &sink, &cancel).await;
        drop(sink);
        render.await.context("Progress renderer panicked")?;

        match outcome {
            FetchOutcome::Cached(path) => {
                println!("{}", path.display());
                return Ok(ExitCode::SUCCESS);
            }
            FetchOutcome::Recovered(path) => {
                eprintln!("warning: download complete but not cached, using staging file");
                println!("{}", path.display());
                return Ok(ExitCode::SUCCESS);
            }
            FetchOutcome::Failed(FetchError::Cancelled(written)) => {
                eprintln!("interrupted after {written} bytes, run again to resume");
                return Ok(ExitCode::from(INTERRUPTED));
            }
            FetchOutcome::Failed(e) if e.is_retryable() && attempt < retries => {
                let delay = retry_delay(attempt, backoff);
                attempt += 1;
                warn!(error = %e, attempt, ?delay, "download failed, retrying");
                tokio::time::sleep(delay).await;
            }
            FetchOutcome::Failed(e) => {
                info!(attempts = attempt + 1, "giving up");
                return Err(anyhow!(e).context(format!("Failed to download {}", arg.url.trim())));
            }
        }
    }
}

/// Drives one progress bar until the sink side of `rx` is dropped.
async fn render(mut rx: UnboundedReceiver<DownloadProgress>, quiet: bool) {
    let mut tracker: Option<ProgressTracker> = None;
    let mut complete = false;

    while let Some(progress) = rx.recv().await {
        let tracker = tracker.get_or_insert_with(|| {
            ProgressTrackerBuilder::default()
                .with_len(progress.total)
                .with_prefix("Downloading")
                .with_finish("done")
                .hidden(quiet)
                .build()
        });
        tracker.step(progress);
        complete = progress.is_complete();
    }

    match tracker {
        Some(tracker) if complete => tracker.finish(),
        Some(tracker) => tracker.abandon(),
        None => {}
    }
}
