//! Session policy configuration.
//!
//! One policy, applied uniformly: a session dies at whichever comes first
//! of its expiry timestamp, two idle hours, or seven days of age.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timeouts and limits for the session lifecycle.
///
/// Derives `Serialize`/`Deserialize` so hosts can embed it in their own
/// configuration files. Start from `SessionConfig::default()` and
/// override the fields you care about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Lifetime given to a new session when the caller has no preference.
    /// Default: 24 hours.
    pub session_ttl: Duration,

    /// A session with no recorded activity for this long is dead.
    /// Default: 2 hours.
    pub idle_timeout: Duration,

    /// A session older than this is dead, no matter how often it was
    /// extended. Default: 7 days.
    pub absolute_timeout: Duration,

    /// Minimum gap between two persisted activity updates for one session.
    /// Default: 5 minutes.
    pub activity_update_interval: Duration,

    /// How recent `last_activity` must be for a session to count as
    /// "online" in [`active_count`](crate::SessionManager::active_count).
    /// Default: 5 minutes.
    pub active_window: Duration,

    /// Sessions retained per user. Creating one more evicts the oldest.
    /// Default: 5.
    pub max_sessions_per_user: usize,

    /// Deadline for every individual store call. Default: 5 seconds.
    pub store_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_ttl: Duration::from_secs(24 * 60 * 60),
            idle_timeout: Duration::from_secs(2 * 60 * 60),
            absolute_timeout: Duration::from_secs(7 * 24 * 60 * 60),
            activity_update_interval: Duration::from_secs(5 * 60),
            active_window: Duration::from_secs(5 * 60),
            max_sessions_per_user: 5,
            store_timeout: Duration::from_secs(5),
        }
    }
}

impl SessionConfig {
    /// Shortest store deadline accepted.
    pub const MIN_STORE_TIMEOUT: Duration = Duration::from_millis(10);

    /// Clamps out-of-range values so the config is safe to use.
    ///
    /// Rules:
    /// - `max_sessions_per_user` is at least 1.
    /// - `store_timeout` is at least [`Self::MIN_STORE_TIMEOUT`].
    /// - zero timeouts fall back to their defaults.
    /// - `session_ttl` never exceeds `absolute_timeout`.
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();

        if self.max_sessions_per_user == 0 {
            tracing::warn!("max_sessions_per_user is 0, using 1");
            self.max_sessions_per_user = 1;
        }
        if self.store_timeout < Self::MIN_STORE_TIMEOUT {
            tracing::warn!(
                store_timeout_ms = self.store_timeout.as_millis() as u64,
                "store_timeout below minimum, raising"
            );
            self.store_timeout = Self::MIN_STORE_TIMEOUT;
        }
        if self.idle_timeout.is_zero() {
            tracing::warn!("idle_timeout is 0, using default");
            self.idle_timeout = defaults.idle_timeout;
        }
        if self.absolute_timeout.is_zero() {
            tracing::warn!("absolute_timeout is 0, using default");
            self.absolute_timeout = defaults.absolute_timeout;
        }
        if self.session_ttl.is_zero() {
            tracing::warn!("session_ttl is 0, using default");
            self.session_ttl = defaults.session_ttl;
        }
        if self.session_ttl > self.absolute_timeout {
            tracing::warn!(
                session_ttl_secs = self.session_ttl.as_secs(),
                absolute_timeout_secs = self.absolute_timeout.as_secs(),
                "session_ttl exceeds absolute_timeout, clamping"
            );
            self.session_ttl = self.absolute_timeout;
        }
        self
    }
}
