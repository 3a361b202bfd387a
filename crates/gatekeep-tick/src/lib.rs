//! Fixed-interval scheduler for Gatekeep.
//!
//! Two things in the session core run on a timer, independent of request
//! traffic: the maintenance sweep (hourly by default) and the client
//! heartbeat (every 30 s while a protected view is open). Both use
//! [`TickScheduler`].
//!
//! # Disabled mode
//!
//! When `interval` is zero, [`TickScheduler::wait_for_tick`] pends forever.
//! A host that runs sweeps from an external cron sets the sweep interval
//! to zero and the background task simply never fires.
//!
//! # Integration
//!
//! The scheduler sits inside a task's `tokio::select!` loop next to a
//! shutdown signal:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         _ = shutdown.changed() => break,
//!         _ = scheduler.wait_for_tick() => {
//!             manager.sweep_expired().await;
//!             scheduler.record_tick_end();
//!         }
//!     }
//! }
//! ```
//!
//! All timing uses Tokio's clock, so tests drive it with
//! `tokio::time::pause()`.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for a [`TickScheduler`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickConfig {
    /// Time between ticks. Zero disables the scheduler.
    pub interval: Duration,
    /// Upper bound of random delay added to the *first* tick, so that many
    /// processes started together don't sweep the same store in lockstep.
    pub initial_jitter: Duration,
    /// Fraction of the interval a single run may use before a warning is
    /// logged. Clamped to `0.0..=1.0`.
    pub budget_warn_threshold: f64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            interval: Duration::ZERO,
            initial_jitter: Duration::ZERO,
            budget_warn_threshold: 0.80,
        }
    }
}

impl TickConfig {
    /// Shortest interval accepted. Anything shorter (but non-zero) is raised
    /// to this.
    pub const MIN_INTERVAL: Duration = Duration::from_millis(10);

    /// A config for the given interval with default settings.
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }

    /// Clamps out-of-range values so the config is safe to use.
    ///
    /// Called automatically by [`TickScheduler::new`].
    pub fn validated(mut self) -> Self {
        if !self.interval.is_zero() && self.interval < Self::MIN_INTERVAL {
            warn!(
                interval_ms = self.interval.as_millis() as u64,
                min_ms = Self::MIN_INTERVAL.as_millis() as u64,
                "tick interval below minimum, raising"
            );
            self.interval = Self::MIN_INTERVAL;
        }
        self.budget_warn_threshold = self.budget_warn_threshold.clamp(0.0, 1.0);
        self
    }

    /// `true` if the scheduler will never fire.
    pub fn is_disabled(&self) -> bool {
        self.interval.is_zero()
    }
}

// ---------------------------------------------------------------------------
// Tick info
// ---------------------------------------------------------------------------

/// Information about a fired tick, returned by [`TickScheduler::wait_for_tick`].
#[derive(Debug, Clone)]
pub struct TickInfo {
    /// Monotonically increasing tick number (starts at 1).
    pub tick: u64,
    /// `true` if this tick fired more than 10% of an interval late.
    pub overrun: bool,
    /// Whole intervals missed before this tick fired.
    pub ticks_skipped: u64,
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Runtime metrics, updated on every tick and every [`TickScheduler::record_tick_end`].
#[derive(Debug, Clone, Default)]
pub struct TickMetrics {
    pub total_ticks: u64,
    pub total_overruns: u64,
    pub total_skipped: u64,
    /// Exponential moving average of run time (α = 0.1).
    pub avg_run_time: Duration,
    pub max_run_time: Duration,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Fixed-interval scheduler. One per background task.
pub struct TickScheduler {
    config: TickConfig,
    tick_count: u64,
    next_tick: Option<Instant>,
    run_start: Option<Instant>,
    metrics: TickMetrics,
}

impl TickScheduler {
    /// Creates a scheduler. The first tick is due one interval (plus
    /// jitter) from now.
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();

        let next_tick = if config.is_disabled() {
            debug!("tick scheduler created disabled");
            None
        } else {
            let jitter = if config.initial_jitter.is_zero() {
                Duration::ZERO
            } else {
                let max_us = config.initial_jitter.as_micros() as u64;
                Duration::from_micros(rand::rng().random_range(0..max_us))
            };
            debug!(
                interval_ms = config.interval.as_millis() as u64,
                jitter_ms = jitter.as_millis() as u64,
                "tick scheduler created"
            );
            Some(Instant::now() + config.interval + jitter)
        };

        Self {
            config,
            tick_count: 0,
            next_tick,
            run_start: None,
            metrics: TickMetrics::default(),
        }
    }

    /// Waits until the next tick is due.
    ///
    /// A tick that fires late never causes a catch-up burst: missed ticks
    /// are counted and the next one is due one interval from now.
    ///
    /// Pends forever when disabled, which lets `tokio::select!` keep
    /// serving its other branches.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        let Some(next) = self.next_tick else {
            return std::future::pending::<TickInfo>().await;
        };
        let interval = self.config.interval;

        time::sleep_until(next).await;

        let now = Instant::now();
        self.tick_count += 1;
        self.run_start = Some(now);

        let late_by = now.saturating_duration_since(next);
        let overrun = late_by > interval / 10;
        let ticks_skipped = if overrun {
            (late_by.as_nanos() / interval.as_nanos()) as u64
        } else {
            0
        };

        if ticks_skipped > 0 {
            warn!(
                tick = self.tick_count,
                skipped = ticks_skipped,
                late_ms = late_by.as_millis() as u64,
                "tick overrun, skipping ahead"
            );
        }
        self.next_tick = Some(now + interval);

        if overrun {
            self.metrics.total_overruns += 1;
        }
        self.metrics.total_skipped += ticks_skipped;
        self.metrics.total_ticks += 1;

        trace!(tick = self.tick_count, overrun, "tick fired");

        TickInfo {
            tick: self.tick_count,
            overrun,
            ticks_skipped,
        }
    }

    /// Records that the work for the current tick finished.
    ///
    /// Feeds the run-time metrics and warns when a run used more than the
    /// configured share of the interval.
    pub fn record_tick_end(&mut self) {
        let Some(start) = self.run_start.take() else {
            return;
        };
        let elapsed = start.elapsed();

        let interval = self.config.interval;
        if !interval.is_zero() {
            let utilization = elapsed.as_secs_f64() / interval.as_secs_f64();
            if utilization >= self.config.budget_warn_threshold {
                warn!(
                    tick = self.tick_count,
                    elapsed_ms = elapsed.as_millis() as u64,
                    interval_ms = interval.as_millis() as u64,
                    "scheduled run is using most of its interval"
                );
            }
        }

        if elapsed > self.metrics.max_run_time {
            self.metrics.max_run_time = elapsed;
        }
        let alpha = 0.1;
        let prev = self.metrics.avg_run_time.as_secs_f64();
        self.metrics.avg_run_time = Duration::from_secs_f64(
            prev * (1.0 - alpha) + elapsed.as_secs_f64() * alpha,
        );
    }

    pub fn is_disabled(&self) -> bool {
        self.config.is_disabled()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn metrics(&self) -> &TickMetrics {
        &self.metrics
    }

    pub fn interval(&self) -> Duration {
        self.config.interval
    }
}
