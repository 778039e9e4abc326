use std::time::Duration;

/// Backoff before the `attempt`-th retry: `base * 2^attempt`, saturating.
///
/// The downloader itself never retries; this is for callers that re-run
/// [`Downloader::fetch`](crate::Downloader::fetch) after a failed outcome,
/// which then resumes from the staged offset.
///
/// ```
/// use std::time::Duration;
/// use recache_fetch::core::retry_delay;
///
/// let base = Duration::from_millis(250);
/// assert_eq!(retry_delay(0, base), Duration::from_millis(250));
/// assert_eq!(retry_delay(3, base), Duration::from_secs(2));
/// ```
pub fn retry_delay(attempt: u32, base: Duration) -> Duration {
    base.saturating_mul(2_u32.saturating_pow(attempt))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_doubles() {
        let base = Duration::from_millis(100);
        let delays: Vec<_> = (0..4).map(|n| retry_delay(n, base)).collect();
        assert_eq!(delays, [100, 200, 400, 800].map(Duration::from_millis));
    }

    #[test]
    fn test_retry_delay_zero_base() {
        assert_eq!(retry_delay(7, Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn test_retry_delay_saturates() {
        assert_eq!(retry_delay(40, Duration::from_secs(1)), Duration::from_secs(u64::from(u32::MAX)));
        assert_eq!(retry_delay(2, Duration::MAX), Duration::MAX);
    }
}
