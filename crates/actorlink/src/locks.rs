//! Per-key async mutual exclusion.
//!
//! Read-modify-write sequences on one trust relationship or one suspension
//! key must not interleave. Different keys proceed in parallel.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Held while a key is locked. Dropping it releases the key.
pub(crate) type KeyGuard = OwnedMutexGuard<()>;

/// A set of async mutexes created on demand, one per key.
pub(crate) struct KeyedLocks<K> {
    slots: Mutex<HashMap<K, Arc<AsyncMutex<()>>>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Wait until `key` is free and take it.
    pub(crate) async fn lock(&self, key: &K) -> KeyGuard {
        let slot = {
            // The map is only touched by non-panicking HashMap calls, so a
            // poisoned lock still guards a consistent map.
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            // Slots nobody holds or waits on are dropped.
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            Arc::clone(slots.entry(key.clone()).or_default())
        };
        slot.lock_owned().await
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
