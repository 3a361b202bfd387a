//! Session lifecycle management for Gatekeep.
//!
//! This crate owns every write to the session store:
//!
//! 1. **Creation**: new random identifier, per-user retention bound
//!    ([`SessionManager::create`])
//! 2. **Validation**: expiry, idle, absolute-age and account checks,
//!    with throttled activity writes ([`SessionManager::validate`])
//! 3. **Extension and deletion**: explicit only, always idempotent
//! 4. **Maintenance**: bulk sweeps and the "currently online" gauge
//!
//! # How it fits in the stack
//!
//! ```text
//! Request Gate (above)    ← asks "is this session valid right now?"
//!     ↕
//! Session Layer (this crate) ← decides, deletes stale records
//!     ↕
//! Store Layer (below)     ← Session records, repositories, clock
//! ```

mod config;
mod error;
mod keyed;
mod manager;
mod throttle;
mod validation;

pub use config::SessionConfig;
pub use error::SessionError;
pub use manager::SessionManager;
pub use throttle::{Throttle, ThrottleGuard};
pub use validation::{InvalidReason, Validation, expiry_reason};
