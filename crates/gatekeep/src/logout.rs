//! Forced-logout notifications.
//!
//! Deleting a user's sessions ends them at the next request, but an open
//! page with a live connection would not notice until its heartbeat.
//! [`LogoutEvent`]s let the host push the news to those connections
//! right away. Delivery is the host's job; the core only guarantees the
//! records are gone before the event is published.

use chrono::{DateTime, Utc};
use gatekeep_store::UserId;
use serde::{Deserialize, Serialize};

/// Published on every forced logout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogoutEvent {
    pub user_id: UserId,
    /// Free-form reason for logs and telemetry ("deactivated",
    /// "password_changed", ...).
    pub reason: String,
    /// How many sessions were deleted.
    pub sessions_removed: u64,
    pub at: DateTime<Utc>,
}
