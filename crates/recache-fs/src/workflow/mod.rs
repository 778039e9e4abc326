mod lock;

pub use lock::KeyLock;
