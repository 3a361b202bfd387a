//! Request-time session checks for Gatekeep.
//!
//! A request passes through several independent checkpoints, each able to
//! end the session on its own:
//!
//! ```text
//! Edge ──→ InitialRender ──→ PostLoad ──→ Heartbeat (every 30 s)
//!  │            │                │              │
//!  └────────────┴───── any failure ─────────────┘
//!                          ↓
//!     delete record · clear credentials · Invalidated { reason }
//! ```
//!
//! Each checkpoint re-runs token decoding and session validation. The
//! redundancy is the point: a later checkpoint catches what changed
//! after an earlier one passed.
//!
//! - [`Checkpoint`]: the named stages and their pure decision functions
//! - [`RequestGate`]: runs a checkpoint end to end
//! - [`CredentialJar`] / [`CookieJar`]: where client credentials live
//! - [`Heartbeat`]: the periodic check while a view stays open

mod checkpoint;
mod config;
mod error;
mod gate;
mod heartbeat;
mod jar;

pub use checkpoint::{Checkpoint, GateReason, RequestContext, VerifiedSession};
pub use config::GateConfig;
pub use error::GateError;
pub use gate::{GateOutcome, RequestGate};
pub use heartbeat::Heartbeat;
pub use jar::{CookieJar, CredentialJar};
