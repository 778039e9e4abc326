//! Pure transformations used by the download pipeline.
//!
//! Nothing here touches the network or the filesystem.

mod key;
mod range;
mod retry;

pub use key::CacheKey;
pub use range::{ContentRange, range_header};
pub use retry::retry_delay;
