//! Immutable data types for downloads.
//!
//! Configuration, the progress value handed to sinks, and the cancellation
//! predicate polled by the read loop.

pub mod cancel;
pub mod options;
pub mod progress;

pub use cancel::{Cancel, CancelToken, NeverCancel};
pub use options::{ClientConfig, DownloaderConfig, Timeouts};
pub use progress::{ChannelSink, DownloadProgress, NoopSink, ProgressSink};
