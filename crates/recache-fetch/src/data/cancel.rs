use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative cancellation, polled once per buffer by the download loop.
///
/// Cancellation is never preemptive: a buffer already read is either written
/// completely or not at all, so the staging file always stays resumable.
pub trait Cancel: Send + Sync {
    fn is_cancelled(&self) -> bool;
}

impl<F> Cancel for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn is_cancelled(&self) -> bool { self() }
}

/// A predicate that never fires.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCancel;

impl Cancel for NeverCancel {
    fn is_cancelled(&self) -> bool { false }
}

/// A shareable cancellation flag.
///
/// Clones observe the same flag, so one clone can be handed to a signal
/// handler while another is passed to [`Downloader::fetch`](crate::Downloader::fetch).
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self { Self::default() }

    pub fn cancel(&self) { self.0.store(true, Ordering::SeqCst); }

    /// Clears the flag so the token can drive a later resume.
    pub fn reset(&self) { self.0.store(false, Ordering::SeqCst); }
}

impl Cancel for CancelToken {
    fn is_cancelled(&self) -> bool { self.0.load(Ordering::SeqCst) }
}
