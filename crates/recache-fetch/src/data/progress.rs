use tokio::sync::mpsc;

/// Snapshot of a running download, emitted after each buffer is written.
///
/// `downloaded` counts bytes present in the staging file, including bytes
/// written by earlier interrupted attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    /// 0..=100, or 0 while the total is unknown.
    pub percent:    u8,
    pub downloaded: u64,
    pub total:      Option<u64>,
}

impl DownloadProgress {
    pub fn new(downloaded: u64, total: Option<u64>) -> Self {
        let percent = match total {
            Some(total) if total > 0 => {
                let ratio = u128::from(downloaded) * 100 / u128::from(total);
                ratio.min(100) as u8
            }
            _ => 0,
        };
        Self {
            percent,
            downloaded,
            total,
        }
    }

    pub fn is_complete(&self) -> bool { self.total.is_some_and(|total| self.downloaded >= total) }
}

/// Receiver of progress notifications.
///
/// Called inline on the task driving the download, so implementations must
/// return quickly. Forward to a channel with [`ChannelSink`] when the consumer
/// lives elsewhere.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, progress: DownloadProgress);
}

impl<F> ProgressSink for F
where
    F: Fn(DownloadProgress) + Send + Sync,
{
    fn on_progress(&self, progress: DownloadProgress) { self(progress) }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn on_progress(&self, _: DownloadProgress) {}
}

/// Forwards progress into an unbounded channel.
///
/// Events are dropped silently once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<DownloadProgress>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DownloadProgress>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn on_progress(&self, progress: DownloadProgress) { let _ = self.tx.send(progress); }
}
