//! "Refresh only if stale beyond a threshold", with in-flight dedup.
//!
//! Writing `last_activity` on every request costs one store write per
//! request. [`Throttle`] turns that into at most one write per key per
//! interval, and at most one *in flight* per key: a second request that
//! arrives while a write for the same session is still running simply
//! skips its own.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use gatekeep_store::to_chrono;

/// Rate limiter for timestamp refreshes, keyed by `K`.
#[derive(Debug)]
pub struct Throttle<K: Eq + Hash> {
    interval: chrono::Duration,
    in_flight: Arc<Mutex<HashSet<K>>>,
}

impl<K: Eq + Hash + Clone> Throttle<K> {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: to_chrono(interval),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// `true` when `last` is at least one interval behind `now`.
    pub fn is_due(&self, last: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - last >= self.interval
    }

    /// Claims the right to refresh `key`.
    ///
    /// Returns `None` if the refresh isn't due yet or another refresh for
    /// the same key is still in flight. The claim is released when the
    /// returned guard is dropped.
    pub fn begin(
        &self,
        key: K,
        last: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Option<ThrottleGuard<K>> {
        if !self.is_due(last, now) {
            return None;
        }
        let mut in_flight =
            self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(key.clone()) {
            return None;
        }
        Some(ThrottleGuard {
            key: Some(key),
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    /// Number of refreshes currently in flight.
    pub fn in_flight(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Drop guard releasing a [`Throttle`] claim.
///
/// Owned (no borrow of the throttle) so it can move into a spawned task.
#[derive(Debug)]
pub struct ThrottleGuard<K: Eq + Hash> {
    key: Option<K>,
    in_flight: Arc<Mutex<HashSet<K>>>,
}

impl<K: Eq + Hash> Drop for ThrottleGuard<K> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&key);
        }
    }
}
