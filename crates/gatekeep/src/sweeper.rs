//! Background maintenance sweeps.
//!
//! Sessions nobody presents again are never validated, so validation
//! alone would leave them in the store forever. The sweeper deletes
//! expired, too-old, and idle sessions on a fixed interval regardless of
//! request traffic.

use std::time::Duration;

use gatekeep_session::SessionManager;
use gatekeep_store::{SessionRepository, UserRepository};
use gatekeep_tick::{TickConfig, TickScheduler};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::GatekeepError;

/// Sweeper schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Time between sweeps. Zero disables the sweeper.
    pub interval: Duration,
    /// Random delay before the first sweep, so replicas started together
    /// don't all hit the store at once.
    pub initial_jitter: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60 * 60),
            initial_jitter: Duration::from_secs(60),
        }
    }
}

impl SweepConfig {
    fn tick_config(&self) -> TickConfig {
        TickConfig {
            interval: self.interval,
            initial_jitter: self.initial_jitter,
            ..TickConfig::default()
        }
    }
}

/// Totals over a sweeper's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub runs: u64,
    pub expired_removed: u64,
    pub idle_removed: u64,
    pub failures: u64,
    /// Sweeps that started more than a tenth of an interval late.
    pub late_runs: u64,
    /// Longest single sweep.
    pub max_run_time: Duration,
}

/// Handle to a running sweeper task.
pub struct SweeperHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<SweepStats>,
}

impl SweeperHandle {
    /// Stops the sweeper after any sweep in progress and returns its
    /// totals.
    ///
    /// # Errors
    /// [`GatekeepError::Task`] if the task panicked or was aborted.
    pub async fn shutdown(self) -> Result<SweepStats, GatekeepError> {
        let _ = self.shutdown.send(());
        self.task
            .await
            .map_err(|e| GatekeepError::Task(e.to_string()))
    }

    /// `true` once the task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawns the sweeper for `sessions`.
pub(crate) fn spawn<S, U>(
    sessions: SessionManager<S, U>,
    config: &SweepConfig,
) -> SweeperHandle
where
    S: SessionRepository,
    U: UserRepository,
{
    let (shutdown, shutdown_rx) = oneshot::channel();
    let scheduler = TickScheduler::new(config.tick_config());
    if scheduler.is_disabled() {
        tracing::warn!("sweep interval is zero, sweeper disabled");
    }
    let task = tokio::spawn(run(sessions, scheduler, shutdown_rx));
    SweeperHandle { shutdown, task }
}

async fn run<S, U>(
    sessions: SessionManager<S, U>,
    mut scheduler: TickScheduler,
    mut shutdown: oneshot::Receiver<()>,
) -> SweepStats
where
    S: SessionRepository,
    U: UserRepository,
{
    let mut stats = SweepStats::default();
    tracing::info!(
        interval_secs = scheduler.interval().as_secs(),
        "session sweeper started"
    );

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            tick = scheduler.wait_for_tick() => {
                sweep_once(&sessions, &mut stats).await;
                scheduler.record_tick_end();
                tracing::debug!(tick = tick.tick, "sweep finished");
            }
        }
    }

    let metrics = scheduler.metrics();
    stats.late_runs = metrics.total_overruns;
    stats.max_run_time = metrics.max_run_time;

    tracing::info!(
        runs = stats.runs,
        expired_removed = stats.expired_removed,
        idle_removed = stats.idle_removed,
        failures = stats.failures,
        max_run_ms = stats.max_run_time.as_millis() as u64,
        "session sweeper stopped"
    );
    stats
}

async fn sweep_once<S, U>(sessions: &SessionManager<S, U>, stats: &mut SweepStats)
where
    S: SessionRepository,
    U: UserRepository,
{
    stats.runs += 1;

    match sessions.sweep_expired().await {
        Ok(n) => stats.expired_removed += n,
        Err(e) => {
            stats.failures += 1;
            tracing::warn!(error = %e, "expired-session sweep failed");
        }
    }
    match sessions.sweep_idle().await {
        Ok(n) => stats.idle_removed += n,
        Err(e) => {
            stats.failures += 1;
            tracing::warn!(error = %e, "idle-session sweep failed");
        }
    }
}
