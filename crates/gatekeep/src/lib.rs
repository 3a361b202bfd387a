//! # Gatekeep
//!
//! Server-held sessions with layered request validation.
//!
//! A login creates a session record in a store and hands the client a
//! signed token naming it. Every request is then checked at several
//! independent points (edge, initial render, post-load, and a periodic
//! heartbeat), and any of them can end the session: the record is
//! deleted and the client's credentials are cleared.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use gatekeep::prelude::*;
//!
//! # async fn run() -> Result<(), GatekeepError> {
//! gatekeep::init_tracing();
//!
//! let users = MemoryUserStore::new();
//! let service = SessionService::builder()
//!     .signing_key(SigningKey::generate())
//!     .build(MemorySessionStore::new(), users.clone());
//! let sweeper = service.spawn_sweeper();
//!
//! let issued = service
//!     .create_session(UserId(1), Duration::from_secs(3600), SessionMetadata::default())
//!     .await?;
//! let outcome = service.validate_session(&issued.token).await;
//! println!("authenticated: {}", outcome.is_authenticated());
//!
//! sweeper.shutdown().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Crates
//!
//! - `gatekeep-store`: records, repository traits, in-memory stores
//! - `gatekeep-session`: lifecycle manager (create, validate, sweep)
//! - `gatekeep-token`: signed client tokens
//! - `gatekeep-gate`: checkpoints, credential jars, heartbeat
//! - `gatekeep-tick`: fixed-interval scheduling for background loops

mod error;
mod logout;
mod service;
mod sweeper;
mod telemetry;

pub use error::GatekeepError;
pub use logout::LogoutEvent;
pub use service::{IssuedSession, SessionService, SessionServiceBuilder};
pub use sweeper::{SweepConfig, SweepStats, SweeperHandle};
pub use telemetry::{init_tracing, init_tracing_with};

pub use gatekeep_gate as gate;
pub use gatekeep_session as session;
pub use gatekeep_store as store;
pub use gatekeep_token as token;

/// Common imports for host applications.
pub mod prelude {
    pub use crate::{
        GatekeepError, IssuedSession, LogoutEvent, SessionService, SessionServiceBuilder,
        SweepConfig, SweeperHandle,
    };
    pub use gatekeep_gate::{
        Checkpoint, CookieJar, CredentialJar, GateConfig, GateOutcome, GateReason,
        RequestContext,
    };
    pub use gatekeep_session::{InvalidReason, SessionConfig};
    pub use gatekeep_store::{
        MemorySessionStore, MemoryUserStore, Role, Session, SessionMetadata,
        SessionRepository, UserId, UserRecord, UserRepository, VerificationStatus,
    };
    pub use gatekeep_token::{SigningKey, TokenConfig};
}
