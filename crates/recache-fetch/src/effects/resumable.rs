//! Range-resumed transfer of one URL into its `<key>_downloading` file.
//!
//! The staging file is append-only while a transfer runs. Whatever was
//! written before a failure or cancellation is flushed and stays in place, so
//! its length is always a valid resume offset for the next attempt.

use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use recache_fs::StagingFiles;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::http::{HttpClient, HttpResponse};
use crate::core::{ContentRange, range_header};
use crate::data::{Cancel, DownloadProgress, ProgressSink};
use crate::error::{FetchError, Result};

const PARTIAL_CONTENT: u16 = 206;
const OK: u16 = 200;
const RANGE_NOT_SATISFIABLE: u16 = 416;

/// Knobs of the read loop, taken from [`DownloaderConfig`](crate::DownloaderConfig).
#[derive(Debug, Clone, Copy)]
pub(crate) struct Transfer {
    pub buffer_size: usize,
    pub pacing:      Option<Duration>,
}

/// How the server answered the range request.
#[derive(Debug, PartialEq, Eq)]
enum Plan {
    /// Append from `offset`.
    Append { total: Option<u64> },
    /// The range was ignored; start from zero.
    Restart { total: Option<u64> },
    /// Nothing left to fetch.
    Complete,
}

fn plan<E>(response: &HttpResponse<E>, offset: u64) -> Result<Plan> {
    match response.status {
        PARTIAL_CONTENT => {
            let header = response.content_range.as_deref().unwrap_or_default();
            let range = ContentRange::parse(header)?;
            // `bytes */<total>` only belongs to a 416
            if range.is_unsatisfied() {
                return Err(FetchError::InvalidContentRange(header.to_string()));
            }
            match range.start {
                Some(start) if start != offset => Err(FetchError::RangeMismatch {
                    expected: offset,
                    actual:   start,
                }),
                _ => Ok(Plan::Append { total: range.total }),
            }
        }
        OK => Ok(Plan::Restart {
            total: response.content_length,
        }),
        RANGE_NOT_SATISFIABLE => {
            let total = response
                .content_range
                .as_deref()
                .and_then(|header| ContentRange::parse(header).ok())
                .and_then(|range| range.total);
            if total == Some(offset) {
                Ok(Plan::Complete)
            } else {
                Err(FetchError::UnexpectedStatus(RANGE_NOT_SATISFIABLE))
            }
        }
        status => Err(FetchError::UnexpectedStatus(status)),
    }
}

/// Brings `<key>_downloading` up to the full resource.
///
/// Returns the final length of the staging file.
pub(crate) async fn download<C: HttpClient>(
    client: &C,
    url: &str,
    staging: &StagingFiles,
    transfer: Transfer,
    sink: &dyn ProgressSink,
    cancel: &dyn Cancel,
) -> Result<u64> {
    let offset = staging.resume_offset()?;
    debug!(url, offset, "requesting range");

    let mut response = client
        .stream(url, &[range_header(offset)])
        .await
        .map_err(FetchError::transport)?;

    let (start, total) = match plan(&response, offset) {
        Ok(Plan::Append { total }) => (offset, total),
        Ok(Plan::Restart { total }) => {
            if offset > 0 {
                debug!(url, discarded = offset, "server ignored range, restarting");
            }
            staging.reset_downloading()?;
            (0, total)
        }
        Ok(Plan::Complete) => {
            debug!(url, offset, "staging file already complete");
            return Ok(offset);
        }
        Err(e @ FetchError::UnexpectedStatus(RANGE_NOT_SATISFIABLE)) => {
            debug!(url, offset, "range not satisfiable, discarding staged bytes");
            staging.reset_downloading()?;
            return Err(e);
        }
        Err(e) => return Err(e),
    };

    let path = staging.downloading_path();
    let mut file = OpenOptions::new()
        .append(true)
        .open(path)
        .await
        .map_err(|e| write_error(path, e))?;

    let pumped = pump(&mut response, &mut file, path, start, total, transfer, sink, cancel).await;
    file.flush().await.map_err(|e| write_error(path, e))?;
    let written = pumped?;

    file.sync_all().await.map_err(|e| write_error(path, e))?;
    match total {
        Some(expected) if written < expected => Err(FetchError::Incomplete {
            expected,
            actual: written,
        }),
        _ => Ok(written),
    }
}

#[allow(clippy::too_many_arguments)]
async fn pump<E: std::error::Error>(
    response: &mut HttpResponse<E>,
    file: &mut File,
    path: &Path,
    mut written: u64,
    total: Option<u64>,
    transfer: Transfer,
    sink: &dyn ProgressSink,
    cancel: &dyn Cancel,
) -> Result<u64> {
    while let Some(chunk) = response.body.next().await {
        let chunk: Bytes = chunk.map_err(FetchError::transport)?;

        for slice in chunk.chunks(transfer.buffer_size) {
            if cancel.is_cancelled() {
                debug!(written, "download cancelled");
                return Err(FetchError::Cancelled(written));
            }

            file.write_all(slice).await.map_err(|e| write_error(path, e))?;
            written += slice.len() as u64;
            sink.on_progress(DownloadProgress::new(written, total));

            if let Some(delay) = transfer.pacing {
                tokio::time::sleep(delay).await;
            }
        }
    }
    Ok(written)
}

fn write_error(path: &Path, source: std::io::Error) -> FetchError {
    recache_fs::Error::Write {
        path: path.to_path_buf(),
        source,
    }
    .into()
}
