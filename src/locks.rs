use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-key mutual exclusion.
///
/// Lifecycle operations on the same module id are serialized; operations on different ids run
/// independently. Waiters are served in FIFO order.
#[derive(Debug, Default)]
pub(crate) struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Waits until `key` is free and holds it until the guard is dropped.
    pub(crate) async fn lock<S: AsRef<str>>(&self, key: S) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // Entries nobody holds or waits for anymore
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            Arc::clone(
                locks
                    .entry(key.as_ref().to_string())
                    .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
            )
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
