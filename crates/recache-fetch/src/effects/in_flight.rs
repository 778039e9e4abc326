use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Slots = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

/// Per-key async exclusion within one process.
///
/// The slot for a key lives only while some caller holds or awaits it.
#[derive(Debug, Clone, Default)]
pub(crate) struct InFlight {
    slots: Slots,
}

impl InFlight {
    /// Waits until no other caller in this process works on `key`.
    pub(crate) async fn enter(&self, key: &str) -> InFlightGuard {
        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(key.to_string()).or_default())
        };
        let guard = slot.lock_owned().await;

        InFlightGuard {
            slots: Arc::clone(&self.slots),
            key:   key.to_string(),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize { self.slots.lock().len() }
}

pub(crate) struct InFlightGuard {
    slots: Slots,
    key:   String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut slots = self.slots.lock();
        drop(self.guard.take());
        // only the registry still holds the slot
        if slots.get(&self.key).is_some_and(|slot| Arc::strong_count(slot) == 1) {
            slots.remove(&self.key);
        }
    }
}
