//! Per-key async mutual exclusion.
//!
//! Session creation for one user must not interleave with another creation
//! for the same user, or both could count "five existing sessions" and
//! each evict one too few. Creations for different users stay concurrent.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// A map of lazily created async mutexes. Entries are removed again when
/// the last holder releases them, so the map only holds keys in use.
pub(crate) struct KeyedMutex<K: Eq + Hash + Clone> {
    locks: Arc<Mutex<HashMap<K, Arc<AsyncMutex<()>>>>>,
}

impl<K: Eq + Hash + Clone> KeyedMutex<K> {
    pub(crate) fn new() -> Self {
        Self {
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Waits for exclusive access to `key`.
    pub(crate) async fn lock(&self, key: K) -> KeyedGuard<K> {
        let mutex = {
            let mut locks =
                self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        let guard = mutex.lock_owned().await;
        KeyedGuard {
            key: Some(key),
            guard: Some(guard),
            locks: Arc::clone(&self.locks),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Holds one key's lock until dropped.
pub(crate) struct KeyedGuard<K: Eq + Hash + Clone> {
    key: Option<K>,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<Mutex<HashMap<K, Arc<AsyncMutex<()>>>>>,
}

impl<K: Eq + Hash + Clone> Drop for KeyedGuard<K> {
    fn drop(&mut self) {
        let Some(key) = self.key.take() else {
            return;
        };
        let mut locks =
            self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Two references left means only the map and our guard know this
        // mutex. New waiters clone under the same map lock, so nobody can
        // pick it up between this check and the removal.
        if locks
            .get(&key)
            .is_some_and(|m| Arc::strong_count(m) <= 2)
        {
            locks.remove(&key);
        }
        self.guard.take();
    }
}
