//! Session store layer for Gatekeep.
//!
//! This crate is the leaf of the workspace. It defines what a session
//! *is* and where sessions live, without knowing anything about how they
//! are validated:
//!
//! - **Types** ([`Session`], [`SessionId`], [`UserId`], [`UserRecord`]):
//!   the persisted record and the slice of the account store we read.
//! - **Repositories** ([`SessionRepository`], [`UserRepository`]): the
//!   seams the lifecycle manager talks to. The account database behind
//!   them belongs to the surrounding application.
//! - **Clock** ([`Clock`], [`SystemClock`], [`ManualClock`]): wall-clock
//!   time as an injected dependency, so expiry rules are testable.
//! - **In-memory stores** ([`MemorySessionStore`], [`MemoryUserStore`]):
//!   behind the `memory` feature (enabled by default).
//!
//! ```text
//! Session Manager (above)  ← decides validity, sole writer
//!     ↕
//! Store Layer (this crate) ← records and CRUD/query operations
//! ```

mod clock;
mod error;
#[cfg(feature = "memory")]
mod memory;
mod repository;
mod types;

pub use clock::{Clock, ManualClock, SystemClock, add_saturating, sub_saturating, to_chrono};
pub use error::StoreError;
#[cfg(feature = "memory")]
pub use memory::{MemorySessionStore, MemoryUserStore};
pub use repository::{SessionRepository, SweepPredicate, UserRepository};
pub use types::{
    Role, Session, SessionId, SessionMetadata, UserId, UserRecord,
    VerificationStatus,
};
