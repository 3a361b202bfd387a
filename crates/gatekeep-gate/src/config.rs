//! Gate configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Configuration for the [`RequestGate`](crate::RequestGate) and its
/// [`Heartbeat`](crate::Heartbeat).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// How often an open protected view re-checks its session.
    pub heartbeat_interval: Duration,

    /// Every cookie that carries credential material. The first one holds
    /// the session token; all of them are expired on invalidation.
    pub cookie_names: Vec<String>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            cookie_names: vec![Self::DEFAULT_COOKIE.to_string()],
        }
    }
}

impl GateConfig {
    pub const DEFAULT_COOKIE: &'static str = "gatekeep_session";

    /// Heartbeats faster than this would hammer the store.
    pub const MIN_HEARTBEAT: Duration = Duration::from_secs(1);

    /// Clamps out-of-range values, logging each correction.
    pub fn validated(mut self) -> Self {
        if self.heartbeat_interval < Self::MIN_HEARTBEAT {
            warn!(
                heartbeat_interval = ?self.heartbeat_interval,
                "heartbeat interval below minimum, raising"
            );
            self.heartbeat_interval = Self::MIN_HEARTBEAT;
        }
        self.cookie_names.retain(|name| !name.trim().is_empty());
        if self.cookie_names.is_empty() {
            warn!("no credential cookies configured, using default");
            self.cookie_names = Self::default().cookie_names;
        }
        self
    }

    /// The cookie holding the session token.
    pub fn token_cookie(&self) -> &str {
        self.cookie_names
            .first()
            .map(String::as_str)
            .unwrap_or(Self::DEFAULT_COOKIE)
    }
}
