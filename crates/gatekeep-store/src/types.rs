//! Persisted session types and the user view the core reads.
//!
//! Everything in this module is plain data. Validity rules live in
//! `gatekeep-session`; this module only answers questions about a record
//! at a given instant (how old is it, how long has it been idle).

use std::fmt;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// An opaque, unguessable session identifier.
///
/// Generated from 32 bytes (256 bits) of `rand`'s thread-local CSPRNG and
/// hex encoded, so the string form is always 64 lowercase hex characters.
/// The identifier is not signed: its only protection is that it cannot be
/// guessed. Integrity of the client-held copy is the token layer's job.
///
/// `Display` prints a short prefix (`S-1a2b3c4d`) so that identifiers can
/// be logged without leaking a usable credential. Use [`as_str`](Self::as_str)
/// when the full value is needed.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Number of random bytes behind each identifier.
    pub const ENTROPY_BYTES: usize = 32;

    /// Generates a fresh random identifier.
    pub fn generate() -> Self {
        let bytes: [u8; Self::ENTROPY_BYTES] = rand::rng().random();
        Self(bytes.iter().map(|b| format!("{b:02x}")).collect())
    }

    /// Wraps an identifier received from a client or a database row.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The full identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The first eight characters, for logs.
    pub fn prefix(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}", self.prefix())
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({}…)", self.prefix())
    }
}

/// Identifier of an account in the external user store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Claims enums
// ---------------------------------------------------------------------------

/// The account roles of the permit application.
///
/// The core never makes authorization decisions with these. They are
/// carried so the client-held token can cache them, and so a changed role
/// can be detected and the token refreshed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Approver,
    Vendor,
    Security,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
            Self::Approver => write!(f, "approver"),
            Self::Vendor => write!(f, "vendor"),
            Self::Security => write!(f, "security"),
        }
    }
}

/// Where an account is in the vendor verification workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pending,
    Verified,
    Rejected,
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Verified => write!(f, "verified"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

// ---------------------------------------------------------------------------
// UserRecord
// ---------------------------------------------------------------------------

/// The fields of an account the session core needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub is_active: bool,
    pub role: Role,
    pub verification: VerificationStatus,
}

impl UserRecord {
    /// Whether sessions owned by this account may stay alive.
    ///
    /// Deactivated accounts and accounts whose verification was rejected
    /// both lose their sessions.
    pub fn can_hold_session(&self) -> bool {
        self.is_active && self.verification != VerificationStatus::Rejected
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Optional client details captured at login.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// Originating address as reported by the request pipeline.
    pub ip_address: Option<String>,
    /// Raw `User-Agent` header.
    pub user_agent: Option<String>,
}

/// A server-held session record.
///
/// The lifecycle manager is the only writer. `last_activity` moves forward
/// on throttled activity writes and on explicit extension; `expires_at`
/// moves forward only on explicit extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: SessionMetadata,
}

impl Session {
    /// Time since the last recorded activity.
    pub fn idle_for(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.last_activity
    }

    /// Time since creation.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.created_at
    }

    /// `true` once `now` has reached `expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
