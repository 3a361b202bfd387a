//! End-to-end tests through the `SessionService` facade.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use gatekeep::prelude::*;
use gatekeep::store::{Clock, ManualClock};
use gatekeep::GatekeepError;

const MIN: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(60 * 60);

struct Harness {
    service: SessionService<MemorySessionStore, MemoryUserStore>,
    store: MemorySessionStore,
    users: MemoryUserStore,
    clock: ManualClock,
}

fn approver(id: u64) -> UserRecord {
    UserRecord {
        id: UserId(id),
        is_active: true,
        role: Role::Approver,
        verification: VerificationStatus::Verified,
    }
}

async fn harness_with(sweep: SweepConfig) -> Harness {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 9, 14, 9, 30, 0).unwrap());
    let store = MemorySessionStore::new();
    let users = MemoryUserStore::new();
    users.upsert(approver(1)).await;
    users.upsert(approver(2)).await;

    let service = SessionService::builder()
        .signing_key(SigningKey::from_bytes(vec![7u8; 32]).unwrap())
        .clock(Arc::new(clock.clone()))
        .sweep_config(sweep)
        .build(store.clone(), users.clone());
    Harness {
        service,
        store,
        users,
        clock,
    }
}

async fn harness() -> Harness {
    harness_with(SweepConfig::default()).await
}

async fn login(h: &Harness, user: u64, ttl: Duration) -> IssuedSession {
    h.service
        .create_session(UserId(user), ttl, SessionMetadata::default())
        .await
        .unwrap()
}

// =========================================================================
// Create and validate
// =========================================================================

#[tokio::test]
async fn test_create_session_then_validate_authenticates() {
    let h = harness().await;
    let issued = login(&h, 1, HOUR).await;

    assert_eq!(issued.session.user_id, UserId(1));
    assert_eq!(h.store.peek(&issued.session.id).await, Some(issued.session.clone()));

    let outcome = h.service.validate_session(&issued.token).await;
    assert!(outcome.is_authenticated());
    assert_eq!(outcome.checkpoint(), Checkpoint::Edge);
}

#[tokio::test]
async fn test_create_session_zero_ttl_errors() {
    let h = harness().await;
    let err = h
        .service
        .create_session(UserId(1), Duration::ZERO, SessionMetadata::default())
        .await
        .unwrap_err();
    assert!(matches!(err, GatekeepError::Session(_)));
    assert!(h.store.is_empty().await);
}

#[tokio::test]
async fn test_create_session_token_carries_user_claims() {
    let h = harness().await;
    let issued = login(&h, 1, HOUR).await;

    let decoded = h.service.gate().bridge().decode(&issued.token).unwrap();
    assert_eq!(decoded.claims.role, Some(Role::Approver));
    assert_eq!(decoded.claims.verification, Some(VerificationStatus::Verified));
    assert_eq!(decoded.session_id(), &issued.session.id);
}

#[tokio::test]
async fn test_validate_session_after_expiry_rejects_envelope() {
    let h = harness().await;
    let issued = login(&h, 1, 10 * MIN).await;

    h.clock.advance(11 * MIN);
    let outcome = h.service.validate_session(&issued.token).await;

    // The envelope expires with the session, so it fails first and the
    // record is left for the sweeper.
    assert_eq!(
        outcome.reason(),
        Some(GateReason::Session(InvalidReason::EnvelopeInvalid))
    );
    assert!(h.store.peek(&issued.session.id).await.is_some());
}

#[tokio::test]
async fn test_validate_session_deactivated_user_deletes_record() {
    let h = harness().await;
    let issued = login(&h, 1, HOUR).await;

    h.users.deactivate(UserId(1)).await;
    let outcome = h.service.validate_session(&issued.token).await;

    assert_eq!(
        outcome.reason(),
        Some(GateReason::Session(InvalidReason::Deactivated))
    );
    assert_eq!(h.store.peek(&issued.session.id).await, None);
}

#[tokio::test]
async fn test_validate_session_garbage_token_invalidates() {
    let h = harness().await;
    let outcome = h.service.validate_session("not-a-token").await;
    assert_eq!(
        outcome.reason(),
        Some(GateReason::Session(InvalidReason::EnvelopeInvalid))
    );
}

#[tokio::test]
async fn test_check_with_cookie_header_authenticates() {
    let h = harness().await;
    let issued = login(&h, 2, HOUR).await;

    let header = format!("theme=dark; {}={}", GateConfig::DEFAULT_COOKIE, issued.token);
    let mut jar = CookieJar::from_header(h.service.gate().config(), &header);
    let ctx = RequestContext::default().client_user(UserId(2));

    let outcome = h.service.check(Checkpoint::PostLoad, &ctx, &mut jar).await;
    assert!(outcome.is_authenticated());
}

// =========================================================================
// Extend and delete
// =========================================================================

#[tokio::test]
async fn test_extend_session_moves_expiry_and_reissues_token() {
    let h = harness().await;
    let issued = login(&h, 1, HOUR).await;

    h.clock.advance(30 * MIN);
    let extended = h.service.extend_session(&issued.token, HOUR).await.unwrap();

    assert_eq!(extended.session.id, issued.session.id);
    assert_eq!(extended.session.expires_at, issued.session.expires_at + chrono::Duration::hours(1));
    assert_eq!(extended.session.last_activity, h.clock.now());
    assert_ne!(extended.token, issued.token);

    let decoded = h.service.gate().bridge().decode(&extended.token).unwrap();
    assert_eq!(decoded.expires_at(), extended.session.expires_at);
    assert!(h.service.validate_session(&extended.token).await.is_authenticated());
}

#[tokio::test]
async fn test_extend_session_reissues_with_current_role() {
    let h = harness().await;
    let issued = login(&h, 1, HOUR).await;
    h.users.modify(UserId(1), |u| u.role = Role::Admin).await;

    let extended = h.service.extend_session(&issued.token, HOUR).await.unwrap();

    let decoded = h.service.gate().bridge().decode(&extended.token).unwrap();
    assert_eq!(decoded.claims.role, Some(Role::Admin));
    assert_eq!(decoded.claims.verification, Some(VerificationStatus::Verified));
}

#[tokio::test]
async fn test_extend_session_after_delete_errors() {
    let h = harness().await;
    let issued = login(&h, 1, HOUR).await;
    assert!(h.service.delete_session(&issued.token).await.unwrap());

    let err = h.service.extend_session(&issued.token, HOUR).await.unwrap_err();
    assert!(matches!(err, GatekeepError::Session(_)));
}

#[tokio::test]
async fn test_delete_session_is_idempotent() {
    let h = harness().await;
    let issued = login(&h, 1, HOUR).await;

    assert!(h.service.delete_session(&issued.token).await.unwrap());
    assert!(!h.service.delete_session(&issued.token).await.unwrap());
    assert!(h.store.is_empty().await);
}

#[tokio::test]
async fn test_delete_session_tampered_token_errors() {
    let h = harness().await;
    let issued = login(&h, 1, HOUR).await;

    let mut tampered = issued.token.clone();
    tampered.push('x');
    let err = h.service.delete_session(&tampered).await.unwrap_err();

    assert!(matches!(err, GatekeepError::Token(_)));
    assert!(h.store.peek(&issued.session.id).await.is_some());
}

// =========================================================================
// Forced logout
// =========================================================================

#[tokio::test]
async fn test_force_logout_publishes_event_after_deleting() {
    let h = harness().await;
    let first = login(&h, 1, HOUR).await;
    let second = login(&h, 1, HOUR).await;
    let other = login(&h, 2, HOUR).await;
    let mut events = h.service.subscribe_logouts();

    let event = h.service.force_logout(UserId(1), "password_changed").await.unwrap();

    assert_eq!(event.sessions_removed, 2);
    assert_eq!(event.reason, "password_changed");
    assert_eq!(event.at, h.clock.now());
    assert_eq!(events.recv().await.unwrap(), event);

    assert_eq!(h.store.peek(&first.session.id).await, None);
    assert_eq!(h.store.peek(&second.session.id).await, None);
    assert!(h.service.validate_session(&other.token).await.is_authenticated());
}

#[tokio::test]
async fn test_force_logout_without_subscribers_succeeds() {
    let h = harness().await;
    login(&h, 1, HOUR).await;

    let event = h.service.force_logout(UserId(1), "deactivated").await.unwrap();
    assert_eq!(event.sessions_removed, 1);
}

#[tokio::test]
async fn test_force_logout_store_failure_publishes_nothing() {
    let h = harness().await;
    login(&h, 1, HOUR).await;
    let mut events = h.service.subscribe_logouts();

    h.store.set_failing(true);
    assert!(h.service.force_logout(UserId(1), "incident").await.is_err());
    assert!(events.try_recv().is_err());
}

#[test]
fn test_logout_event_serializes() {
    let event = LogoutEvent {
        user_id: UserId(9),
        reason: "deactivated".into(),
        sessions_removed: 3,
        at: Utc.with_ymd_and_hms(2026, 9, 14, 9, 30, 0).unwrap(),
    };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["sessions_removed"], 3);
    assert_eq!(json["reason"], "deactivated");
}

// =========================================================================
// Queries and sweeps
// =========================================================================

#[tokio::test]
async fn test_list_sessions_and_active_count() {
    let h = harness().await;
    login(&h, 1, HOUR).await;
    h.clock.advance(MIN);
    login(&h, 1, HOUR).await;
    login(&h, 2, HOUR).await;

    let listed = h.service.list_sessions(UserId(1)).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed[0].created_at < listed[1].created_at);

    assert_eq!(h.service.active_session_count().await.unwrap(), 3);
}

#[tokio::test]
async fn test_delete_all_sessions_for_user_counts_removed() {
    let h = harness().await;
    login(&h, 1, HOUR).await;
    login(&h, 1, HOUR).await;

    assert_eq!(h.service.delete_all_sessions_for_user(UserId(1)).await.unwrap(), 2);
    assert_eq!(h.service.delete_all_sessions_for_user(UserId(1)).await.unwrap(), 0);
}

#[tokio::test]
async fn test_sweeps_through_facade() {
    let h = harness().await;
    login(&h, 1, 10 * MIN).await;
    login(&h, 2, 4 * HOUR).await;

    h.clock.advance(3 * HOUR);
    assert_eq!(h.service.sweep_expired().await.unwrap(), 1);
    assert_eq!(h.service.sweep_idle().await.unwrap(), 1);
    assert!(h.store.is_empty().await);
}

// =========================================================================
// Background tasks
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_sweeper_removes_expired_sessions_on_interval() {
    let h = harness_with(SweepConfig {
        interval: MIN,
        initial_jitter: Duration::ZERO,
    })
    .await;
    login(&h, 1, Duration::from_secs(30)).await;
    login(&h, 2, HOUR).await;
    let sweeper = h.service.spawn_sweeper();

    h.clock.advance(Duration::from_secs(31));
    tokio::time::sleep(MIN + Duration::from_secs(1)).await;

    assert!(!sweeper.is_finished());
    let stats = sweeper.shutdown().await.unwrap();
    assert_eq!(stats.runs, 1);
    assert_eq!(stats.expired_removed, 1);
    assert_eq!(stats.failures, 0);
    assert_eq!(h.store.len().await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_sweeper_counts_store_failures() {
    let h = harness_with(SweepConfig {
        interval: MIN,
        initial_jitter: Duration::ZERO,
    })
    .await;
    let sweeper = h.service.spawn_sweeper();

    h.store.set_failing(true);
    tokio::time::sleep(2 * MIN + Duration::from_secs(1)).await;

    let stats = sweeper.shutdown().await.unwrap();
    assert_eq!(stats.runs, 2);
    assert_eq!(stats.failures, 4);
}

#[tokio::test(start_paused = true)]
async fn test_sweeper_reports_longest_run() {
    let h = harness_with(SweepConfig {
        interval: MIN,
        initial_jitter: Duration::ZERO,
    })
    .await;
    h.store.set_latency(Duration::from_secs(2));
    let sweeper = h.service.spawn_sweeper();

    tokio::time::sleep(MIN + Duration::from_secs(5)).await;

    let stats = sweeper.shutdown().await.unwrap();
    assert_eq!(stats.runs, 1);
    assert_eq!(stats.failures, 0);
    assert_eq!(stats.late_runs, 0);
    assert!(stats.max_run_time >= Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn test_sweeper_zero_interval_never_runs() {
    let h = harness_with(SweepConfig {
        interval: Duration::ZERO,
        initial_jitter: Duration::ZERO,
    })
    .await;
    let sweeper = h.service.spawn_sweeper();

    tokio::time::sleep(HOUR).await;

    let stats = sweeper.shutdown().await.unwrap();
    assert_eq!(stats.runs, 0);
}

#[tokio::test(start_paused = true)]
async fn test_spawn_heartbeat_reports_forced_logout() {
    let h = harness().await;
    let issued = login(&h, 1, HOUR).await;
    let jar = CookieJar::with_token(h.service.gate().config(), issued.token);
    let (heartbeat, report) = h.service.spawn_heartbeat(RequestContext::default(), jar);

    h.service.force_logout(UserId(1), "incident").await.unwrap();
    let reason = tokio::time::timeout(MIN, report)
        .await
        .expect("heartbeat should fire within one interval")
        .expect("heartbeat should report");

    assert_eq!(reason, GateReason::Session(InvalidReason::NotFound));
    let jar = heartbeat.stop().await.unwrap();
    assert_eq!(jar.token(), None);
}

// =========================================================================
// Builder
// =========================================================================

#[test]
fn test_builder_clamps_token_ttl_to_absolute_timeout() {
    let service = SessionService::builder()
        .signing_key(SigningKey::generate())
        .session_config(SessionConfig {
            absolute_timeout: 12 * HOUR,
            ..SessionConfig::default()
        })
        .token_config(TokenConfig {
            token_ttl: 48 * HOUR,
            ..TokenConfig::default()
        })
        .build(MemorySessionStore::new(), MemoryUserStore::new());

    assert_eq!(service.gate().bridge().config().token_ttl, 12 * HOUR);
    assert_eq!(service.config().session_ttl, 12 * HOUR);
}

#[tokio::test]
async fn test_closed_service_fails_closed() {
    let h = harness().await;
    let issued = login(&h, 1, HOUR).await;

    h.service.close().await.unwrap();
    let outcome = h.service.validate_session(&issued.token).await;
    assert_eq!(
        outcome.reason(),
        Some(GateReason::Session(InvalidReason::StoreUnavailable))
    );

    h.service.open().await.unwrap();
}
