// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Sweep scheduler.
//!
//! A single background task that fires each sweep job on its own cadence by
//! submitting [`Job::Sweep`] into the worker pool. Submission never waits: if
//! the queue is full the tick is skipped and the next one tries again.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::sweeper::SweepKind;
use crate::worker_pool::{Job, WorkerPoolHandle};

/// Sweep cadences.
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    /// Interval of the stale-execution job.
    pub stale_interval: Duration,
    /// Interval of the finished-resource job.
    pub finished_interval: Duration,
    /// Interval of the old-failed-resource job.
    pub failed_interval: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            stale_interval: Duration::from_secs(3600),         // hourly
            finished_interval: Duration::from_secs(24 * 3600), // daily
            failed_interval: Duration::from_secs(24 * 3600),   // daily
        }
    }
}

impl ScheduleConfig {
    /// Load configuration from environment variables.
    ///
    /// - `GEOFLOW_SWEEP_STALE_INTERVAL_SECS` (default: 3600)
    /// - `GEOFLOW_SWEEP_FINISHED_INTERVAL_SECS` (default: 86400)
    /// - `GEOFLOW_SWEEP_FAILED_INTERVAL_SECS` (default: 86400)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let secs = |name: &str, default: Duration| {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Self {
            stale_interval: secs("GEOFLOW_SWEEP_STALE_INTERVAL_SECS", defaults.stale_interval),
            finished_interval: secs(
                "GEOFLOW_SWEEP_FINISHED_INTERVAL_SECS",
                defaults.finished_interval,
            ),
            failed_interval: secs("GEOFLOW_SWEEP_FAILED_INTERVAL_SECS", defaults.failed_interval),
        }
    }

    /// Cadence of a sweep job.
    pub fn interval_for(&self, kind: SweepKind) -> Duration {
        match kind {
            SweepKind::StaleExecutions => self.stale_interval,
            SweepKind::FinishedResources => self.finished_interval,
            SweepKind::OldFailedResources => self.failed_interval,
        }
    }
}

/// Background task that triggers sweeps.
pub struct SweepScheduler {
    pool: WorkerPoolHandle,
    config: ScheduleConfig,
    shutdown: Arc<Notify>,
}

impl SweepScheduler {
    /// Create a new scheduler feeding `pool`.
    pub fn new(pool: WorkerPoolHandle, config: ScheduleConfig) -> Self {
        Self {
            pool,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run the scheduler loop until shutdown is signalled.
    pub async fn run(&self) {
        info!(
            stale_interval_secs = self.config.stale_interval.as_secs(),
            finished_interval_secs = self.config.finished_interval.as_secs(),
            failed_interval_secs = self.config.failed_interval.as_secs(),
            "Sweep scheduler started"
        );

        let mut stale = self.ticker(SweepKind::StaleExecutions);
        let mut finished = self.ticker(SweepKind::FinishedResources);
        let mut failed = self.ticker(SweepKind::OldFailedResources);

        loop {
            let kind = tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Sweep scheduler received shutdown signal");
                    break;
                }

                _ = stale.tick() => SweepKind::StaleExecutions,
                _ = finished.tick() => SweepKind::FinishedResources,
                _ = failed.tick() => SweepKind::OldFailedResources,
            };

            self.fire(kind);
        }

        info!("Sweep scheduler stopped");
    }

    /// First tick fires one period after start.
    fn ticker(&self, kind: SweepKind) -> Interval {
        let period = self.config.interval_for(kind);
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    }

    fn fire(&self, kind: SweepKind) {
        match self.pool.try_submit(Job::Sweep(kind)) {
            Ok(()) => debug!(sweep = %kind, "Sweep submitted"),
            Err(e) => warn!(sweep = %kind, error = %e, "Sweep not submitted"),
        }
    }
}
