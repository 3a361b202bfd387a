//! Validation outcomes.
//!
//! Every reason a session can be refused is a *result*, not an error:
//! each one is recoverable by logging in again, and callers must handle
//! all of them the same way (clear credentials, send the user to login).

use std::fmt;

use chrono::{DateTime, Utc};
use gatekeep_store::{Session, UserRecord, to_chrono};
use serde::{Deserialize, Serialize};

use crate::SessionConfig;

/// Why a presented session was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    /// No record with this identifier (never issued, logged out, swept).
    NotFound,
    /// `now >= expires_at`.
    Expired,
    /// No recorded activity for `idle_timeout`.
    IdleTimeout,
    /// Older than `absolute_timeout`.
    AbsoluteTimeout,
    /// The owning account is missing, deactivated, or rejected.
    Deactivated,
    /// The client-held envelope failed signature, format, or expiry checks.
    EnvelopeInvalid,
    /// The store timed out or failed. Treated as invalid (fail closed).
    StoreUnavailable,
}

impl InvalidReason {
    /// Stable machine-readable code, e.g. for a `?reason=` redirect parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Expired => "expired",
            Self::IdleTimeout => "idle_timeout",
            Self::AbsoluteTimeout => "absolute_timeout",
            Self::Deactivated => "deactivated",
            Self::EnvelopeInvalid => "envelope_invalid",
            Self::StoreUnavailable => "store_unavailable",
        }
    }

    /// Human-readable explanation shown on the login page.
    pub fn message(&self) -> &'static str {
        match self {
            Self::NotFound => "Your session has ended. Please sign in again.",
            Self::Expired => "Your session has expired. Please sign in again.",
            Self::IdleTimeout => {
                "You were signed out after a period of inactivity."
            }
            Self::AbsoluteTimeout => {
                "For your security, please sign in again."
            }
            Self::Deactivated => "Your account is no longer active.",
            Self::EnvelopeInvalid => "Your sign-in could not be verified.",
            Self::StoreUnavailable => {
                "We could not verify your session. Please sign in again."
            }
        }
    }
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotFound => "not found",
            Self::Expired => "expired",
            Self::IdleTimeout => "idle timeout",
            Self::AbsoluteTimeout => "absolute timeout",
            Self::Deactivated => "deactivated",
            Self::EnvelopeInvalid => "envelope invalid",
            Self::StoreUnavailable => "store unavailable",
        })
    }
}

/// The outcome of validating a session.
#[derive(Debug, Clone)]
pub enum Validation {
    /// The session is alive. Carries the record as read (before any
    /// activity write) and the owner's current account state.
    Valid { session: Session, user: UserRecord },
    /// The session is dead; the record has been deleted where applicable.
    Invalid(InvalidReason),
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }

    pub fn reason(&self) -> Option<InvalidReason> {
        match self {
            Self::Valid { .. } => None,
            Self::Invalid(reason) => Some(*reason),
        }
    }

    pub fn session(&self) -> Option<&Session> {
        match self {
            Self::Valid { session, .. } => Some(session),
            Self::Invalid(_) => None,
        }
    }

    pub fn user(&self) -> Option<&UserRecord> {
        match self {
            Self::Valid { user, .. } => Some(user),
            Self::Invalid(_) => None,
        }
    }
}

/// The time-based checks of validation, in order: expiry, idle, age.
///
/// Returns `None` when the record is within all three limits. The
/// account check needs a store round-trip and is done by the manager.
pub fn expiry_reason(
    session: &Session,
    config: &SessionConfig,
    now: DateTime<Utc>,
) -> Option<InvalidReason> {
    if session.is_expired_at(now) {
        Some(InvalidReason::Expired)
    } else if session.idle_for(now) >= to_chrono(config.idle_timeout) {
        Some(InvalidReason::IdleTimeout)
    } else if session.age(now) >= to_chrono(config.absolute_timeout) {
        Some(InvalidReason::AbsoluteTimeout)
    } else {
        None
    }
}
