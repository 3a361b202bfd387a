//! Integration tests for the request gate and the heartbeat.

use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use gatekeep_gate::{
    Checkpoint, CookieJar, CredentialJar, GateConfig, GateOutcome, GateReason,
    Heartbeat, RequestContext, RequestGate,
};
use gatekeep_session::{InvalidReason, SessionConfig, SessionManager};
use gatekeep_store::{
    Clock, ManualClock, MemorySessionStore, MemoryUserStore, Role, Session,
    SessionMetadata, UserId, UserRecord, VerificationStatus,
};
use gatekeep_token::{ClaimSnapshot, CredentialBridge, SigningKey, TokenConfig};

// =========================================================================
// Helpers
// =========================================================================

const MIN: Duration = Duration::from_secs(60);

struct Harness {
    gate: RequestGate<MemorySessionStore, MemoryUserStore>,
    store: MemorySessionStore,
    users: MemoryUserStore,
    clock: ManualClock,
}

fn vendor(id: u64) -> UserRecord {
    UserRecord {
        id: UserId(id),
        is_active: true,
        role: Role::Vendor,
        verification: VerificationStatus::Pending,
    }
}

async fn harness() -> Harness {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 8, 3, 14, 0, 0).unwrap());
    let shared: Arc<dyn Clock> = Arc::new(clock.clone());
    let store = MemorySessionStore::new();
    let users = MemoryUserStore::new();
    users.upsert(vendor(1)).await;
    users.upsert(vendor(2)).await;

    let manager = SessionManager::with_clock(
        store.clone(),
        users.clone(),
        SessionConfig::default(),
        Arc::clone(&shared),
    );
    let bridge = Arc::new(CredentialBridge::with_clock(
        SigningKey::generate(),
        TokenConfig::default(),
        shared,
    ));
    Harness {
        gate: RequestGate::new(manager, bridge, GateConfig::default()),
        store,
        users,
        clock,
    }
}

async fn login(h: &Harness, user: u64) -> (String, Session) {
    let session = h
        .gate
        .sessions()
        .create_default(UserId(user), SessionMetadata::default())
        .await
        .unwrap();
    let token = h
        .gate
        .bridge()
        .issue(&session, ClaimSnapshot::of(&vendor(user)))
        .unwrap();
    (token, session)
}

fn empty_jar(h: &Harness) -> CookieJar {
    CookieJar::new(h.gate.config())
}

fn cleared(jar: &CookieJar) -> bool {
    jar.token().is_none()
        && !jar.set_cookie_headers().is_empty()
        && jar.set_cookie_headers().iter().all(|h| h.contains("Max-Age=0"))
}

async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

// =========================================================================
// Edge
// =========================================================================

#[tokio::test]
async fn test_edge_valid_token_authenticates() {
    let h = harness().await;
    let (token, session) = login(&h, 1).await;
    let mut jar = empty_jar(&h);

    let outcome = h
        .gate
        .check(Checkpoint::Edge, &RequestContext::with_token(token), &mut jar)
        .await;

    match outcome {
        GateOutcome::Authenticated {
            checkpoint,
            session: s,
            user,
            refreshed_token,
        } => {
            assert_eq!(checkpoint, Checkpoint::Edge);
            assert_eq!(s.id, session.id);
            assert_eq!(user.id, UserId(1));
            assert!(refreshed_token.is_none());
        }
        other => panic!("expected Authenticated, got {other:?}"),
    }
    assert!(jar.set_cookie_headers().is_empty());
}

#[tokio::test]
async fn test_edge_reads_token_from_jar() {
    let h = harness().await;
    let (token, _) = login(&h, 1).await;
    let mut jar = CookieJar::with_token(h.gate.config(), token);

    let outcome = h
        .gate
        .check(Checkpoint::Edge, &RequestContext::default(), &mut jar)
        .await;

    assert!(outcome.is_authenticated());
}

#[tokio::test]
async fn test_edge_missing_token_clears_jar() {
    let h = harness().await;
    let mut jar = empty_jar(&h);

    let outcome = h
        .gate
        .check(Checkpoint::Edge, &RequestContext::default(), &mut jar)
        .await;

    assert_eq!(outcome.reason(), Some(GateReason::MissingToken));
    assert!(cleared(&jar));
}

#[tokio::test]
async fn test_edge_tampered_token_is_envelope_invalid_without_delete() {
    let h = harness().await;
    let (token, session) = login(&h, 1).await;
    let tampered = format!("{token}x");
    let mut jar = CookieJar::with_token(h.gate.config(), tampered);

    let outcome = h
        .gate
        .check(Checkpoint::Edge, &RequestContext::default(), &mut jar)
        .await;

    assert_eq!(
        outcome.reason(),
        Some(GateReason::Session(InvalidReason::EnvelopeInvalid))
    );
    assert!(cleared(&jar));
    assert!(h.store.peek(&session.id).await.is_some());
}

#[tokio::test]
async fn test_edge_deactivated_user_deletes_and_clears() {
    let h = harness().await;
    let (token, session) = login(&h, 1).await;
    h.users.deactivate(UserId(1)).await;
    let mut jar = CookieJar::with_token(h.gate.config(), token);

    let outcome = h
        .gate
        .check(Checkpoint::Edge, &RequestContext::default(), &mut jar)
        .await;

    assert_eq!(
        outcome.reason(),
        Some(GateReason::Session(InvalidReason::Deactivated))
    );
    assert!(h.store.peek(&session.id).await.is_none());
    assert_eq!(h.store.removals(), 1);
    assert!(cleared(&jar));
}

#[tokio::test]
async fn test_edge_failing_store_fails_closed() {
    let h = harness().await;
    let (token, _) = login(&h, 1).await;
    h.store.set_failing(true);
    let mut jar = CookieJar::with_token(h.gate.config(), token);

    let outcome = h
        .gate
        .check(Checkpoint::Edge, &RequestContext::default(), &mut jar)
        .await;

    assert_eq!(
        outcome.reason(),
        Some(GateReason::Session(InvalidReason::StoreUnavailable))
    );
    assert!(cleared(&jar));
}

#[tokio::test(start_paused = true)]
async fn test_edge_hung_store_gives_up_within_store_timeout() {
    let h = harness().await;
    let (token, session) = login(&h, 1).await;
    h.store.set_latency(Duration::from_secs(60));
    let mut jar = CookieJar::with_token(h.gate.config(), token);

    let started = tokio::time::Instant::now();
    let outcome = h
        .gate
        .check(Checkpoint::Edge, &RequestContext::default(), &mut jar)
        .await;

    assert_eq!(
        outcome.reason(),
        Some(GateReason::Session(InvalidReason::StoreUnavailable))
    );
    assert!(started.elapsed() <= SessionConfig::default().store_timeout);
    assert!(cleared(&jar));
    assert!(h.store.peek(&session.id).await.is_some());
}

#[tokio::test]
async fn test_edge_records_activity_heartbeat_does_not() {
    let h = harness().await;
    let (token, session) = login(&h, 1).await;
    let ctx = RequestContext::with_token(token);

    h.clock.advance(6 * MIN);
    let beat = h.gate.check(Checkpoint::Heartbeat, &ctx, &mut empty_jar(&h)).await;
    assert!(beat.is_authenticated());
    settle().await;
    assert_eq!(
        h.store.peek(&session.id).await.unwrap().last_activity,
        session.created_at
    );

    let edge = h.gate.check(Checkpoint::Edge, &ctx, &mut empty_jar(&h)).await;
    assert!(edge.is_authenticated());
    settle().await;
    assert_eq!(
        h.store.peek(&session.id).await.unwrap().last_activity,
        h.clock.now()
    );
}

// =========================================================================
// Later checkpoints
// =========================================================================

#[tokio::test]
async fn test_initial_render_state_changed_forces_relogin() {
    let h = harness().await;
    let (token, session) = login(&h, 1).await;
    h.users
        .modify(UserId(1), |u| u.verification = VerificationStatus::Verified)
        .await;
    let ctx = RequestContext::with_token(token).requires(VerificationStatus::Pending);
    let mut jar = empty_jar(&h);

    let outcome = h.gate.check(Checkpoint::InitialRender, &ctx, &mut jar).await;

    assert_eq!(outcome.reason(), Some(GateReason::StateChanged));
    assert_eq!(outcome.checkpoint(), Checkpoint::InitialRender);
    assert!(h.store.peek(&session.id).await.is_none());
    assert!(cleared(&jar));
}

#[tokio::test]
async fn test_post_load_swapped_identity_invalidates() {
    let h = harness().await;
    let (token, session) = login(&h, 1).await;
    let ctx = RequestContext::with_token(token).client_user(UserId(2));
    let mut jar = empty_jar(&h);

    let outcome = h.gate.check(Checkpoint::PostLoad, &ctx, &mut jar).await;

    assert_eq!(outcome.reason(), Some(GateReason::IdentityMismatch));
    assert!(h.store.peek(&session.id).await.is_none());
}

#[tokio::test]
async fn test_chain_runs_every_checkpoint_in_order() {
    let h = harness().await;
    let (token, _) = login(&h, 1).await;
    let ctx = RequestContext::with_token(token)
        .client_user(UserId(1))
        .requires(VerificationStatus::Pending);

    let outcome = h
        .gate
        .check_chain(&Checkpoint::ALL[..3], &ctx, &mut empty_jar(&h))
        .await;

    assert!(outcome.is_authenticated());
    assert_eq!(outcome.checkpoint(), Checkpoint::PostLoad);
}

#[tokio::test]
async fn test_chain_stops_at_first_failure() {
    let h = harness().await;
    let (token, _) = login(&h, 1).await;
    let ctx = RequestContext::with_token(token).requires(VerificationStatus::Verified);

    let outcome = h
        .gate
        .check_chain(&Checkpoint::ALL[..3], &ctx, &mut empty_jar(&h))
        .await;

    assert_eq!(outcome.checkpoint(), Checkpoint::InitialRender);
    assert_eq!(outcome.reason(), Some(GateReason::StateChanged));
}

// =========================================================================
// Token refresh
// =========================================================================

#[tokio::test]
async fn test_old_envelope_is_reissued_into_jar() {
    let h = harness().await;
    let (token, session) = login(&h, 1).await;
    h.clock.advance(6 * MIN);
    let mut jar = CookieJar::with_token(h.gate.config(), token.clone());

    let outcome = h
        .gate
        .check(Checkpoint::Edge, &RequestContext::default(), &mut jar)
        .await;

    let GateOutcome::Authenticated { refreshed_token: Some(fresh), .. } = outcome else {
        panic!("expected a refreshed token");
    };
    assert_ne!(fresh, token);
    assert_eq!(jar.token(), Some(fresh.as_str()));
    let decoded = h.gate.bridge().decode(&fresh).unwrap();
    assert_eq!(decoded.session_id(), &session.id);
    assert_eq!(decoded.issued_at(), h.clock.now());
}

#[tokio::test]
async fn test_role_change_refreshes_claims_immediately() {
    let h = harness().await;
    let (token, _) = login(&h, 1).await;
    h.users.modify(UserId(1), |u| u.role = Role::Approver).await;
    let mut jar = empty_jar(&h);

    let outcome = h
        .gate
        .check(Checkpoint::Edge, &RequestContext::with_token(token), &mut jar)
        .await;

    let GateOutcome::Authenticated { refreshed_token: Some(fresh), .. } = outcome else {
        panic!("expected a refreshed token");
    };
    let decoded = h.gate.bridge().decode(&fresh).unwrap();
    assert_eq!(decoded.claims.role, Some(Role::Approver));
}

// =========================================================================
// Logout
// =========================================================================

#[tokio::test]
async fn test_logout_deletes_session_and_clears_jar() {
    let h = harness().await;
    let (token, session) = login(&h, 1).await;
    let mut jar = CookieJar::with_token(h.gate.config(), token.clone());

    let removed = h.gate.logout(&RequestContext::default(), &mut jar).await.unwrap();

    assert!(removed);
    assert!(cleared(&jar));
    assert!(h.store.peek(&session.id).await.is_none());

    let again = h
        .gate
        .check(Checkpoint::Edge, &RequestContext::with_token(token), &mut empty_jar(&h))
        .await;
    assert_eq!(again.reason(), Some(GateReason::Session(InvalidReason::NotFound)));
}

#[tokio::test]
async fn test_logout_without_token_still_clears() {
    let h = harness().await;
    let mut jar = CookieJar::from_header(h.gate.config(), "gatekeep_session=");

    assert!(h.gate.logout(&RequestContext::default(), &mut jar).await.is_err());
    assert!(cleared(&jar));
}

// =========================================================================
// Heartbeat
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_heartbeat_reports_session_revoked_mid_view() {
    let h = harness().await;
    let (token, session) = login(&h, 1).await;
    let (heartbeat, report) = Heartbeat::spawn(
        h.gate.clone(),
        RequestContext::with_token(token),
        empty_jar(&h),
    );

    tokio::time::sleep(Duration::from_secs(65)).await;
    assert!(!heartbeat.is_finished());

    h.gate.sessions().delete(&session.id).await.unwrap();

    let reason = tokio::time::timeout(Duration::from_secs(31), report)
        .await
        .expect("heartbeat should fire within one interval")
        .expect("heartbeat should report");
    assert_eq!(reason, GateReason::Session(InvalidReason::NotFound));

    let jar = heartbeat.stop().await.unwrap();
    assert!(cleared(&jar));
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_reports_deactivation() {
    let h = harness().await;
    let (token, _) = login(&h, 2).await;
    let (heartbeat, report) = Heartbeat::spawn(
        h.gate.clone(),
        RequestContext::with_token(token),
        empty_jar(&h),
    );

    h.users.deactivate(UserId(2)).await;

    let reason = report.await.unwrap();
    assert_eq!(reason, GateReason::Session(InvalidReason::Deactivated));
    assert!(heartbeat.stop().await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_stop_before_any_failure() {
    let h = harness().await;
    let (token, session) = login(&h, 1).await;
    let (heartbeat, report) = Heartbeat::spawn(
        h.gate.clone(),
        RequestContext::with_token(token),
        empty_jar(&h),
    );

    tokio::time::sleep(Duration::from_secs(95)).await;
    let jar = heartbeat.stop().await.unwrap();

    assert!(report.await.is_err());
    assert!(jar.set_cookie_headers().is_empty());
    assert!(h.store.peek(&session.id).await.is_some());
}

/// A jar that can move between threads but not be shared across them.
struct ThreadLocalJar {
    inner: CookieJar,
    _unsync: PhantomData<Cell<()>>,
}

impl CredentialJar for ThreadLocalJar {
    fn token(&self) -> Option<&str> {
        self.inner.token()
    }

    fn store(&mut self, token: &str) {
        self.inner.store(token);
    }

    fn clear(&mut self) {
        self.inner.clear();
    }
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_runs_with_send_only_jar() {
    let h = harness().await;
    let (token, _) = login(&h, 1).await;
    let jar = ThreadLocalJar {
        inner: CookieJar::with_token(h.gate.config(), token),
        _unsync: PhantomData,
    };
    let (heartbeat, report) =
        Heartbeat::spawn(h.gate.clone(), RequestContext::default(), jar);

    h.users.deactivate(UserId(1)).await;

    let reason = report.await.unwrap();
    assert_eq!(reason, GateReason::Session(InvalidReason::Deactivated));
    let jar = heartbeat.stop().await.unwrap();
    assert!(cleared(&jar.inner));
}
