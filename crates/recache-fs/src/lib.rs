//! Filesystem primitives for the recache staging pipeline.
//!
//! - [`primitives`] - atomic writes and replacing renames
//! - [`staging`] - the `<key>_downloading` / `<key>_done` file pair of one download
//! - [`workflow`] - advisory locks that serialize work on one key across processes

mod error;
pub mod primitives;
pub mod staging;
pub mod workflow;

pub use error::{Error, Result};
pub use primitives::{AtomicWriteOptions, atomic_read, atomic_write, is_atomic_temp, rename_replace};
pub use staging::{StagingFiles, StagingState};
pub use workflow::KeyLock;
