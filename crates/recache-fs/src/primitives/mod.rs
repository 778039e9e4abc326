pub mod rename;
pub mod rw;

pub use rename::{remove_if_exists, rename_replace};
pub use rw::{AtomicWriteOptions, atomic_read, atomic_write, is_atomic_temp};
