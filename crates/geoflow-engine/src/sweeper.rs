// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Sweep jobs that reconcile executions with the container platform.
//!
//! | Job | Selection | Action |
//! |-----|-----------|--------|
//! | stale executions | `RUNNING`/`PENDING`, started more than `stale_after` ago | transition to `FAILED`, remove service |
//! | finished resources | `FINISHED` within the last `finished_window` | remove service |
//! | old failed resources | `FAILED` more than `failed_retention` ago | remove service |
//!
//! Each candidate is handled on its own: orchestrator errors (including an
//! unreachable daemon) and rejected transitions are collected as warnings
//! and the sweep moves on. Only a failure to select candidates aborts a run.
//! The two resource jobs never change an execution's status.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db;
use crate::error::{Error, Result};
use crate::models::{Execution, ExecutionStatus};
use crate::orchestrator::{Orchestrator, RemovalOutcome};
use crate::transition::transition;

/// The three sweep jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepKind {
    /// Force-fail executions that have been live for too long.
    StaleExecutions,
    /// Remove leftover services of recently finished executions.
    FinishedResources,
    /// Remove leftover services of long-failed executions.
    OldFailedResources,
}

impl SweepKind {
    /// All sweep kinds.
    pub const ALL: [SweepKind; 3] = [
        SweepKind::StaleExecutions,
        SweepKind::FinishedResources,
        SweepKind::OldFailedResources,
    ];

    /// Stable name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            SweepKind::StaleExecutions => "stale_executions",
            SweepKind::FinishedResources => "finished_resources",
            SweepKind::OldFailedResources => "old_failed_resources",
        }
    }
}

impl fmt::Display for SweepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sweep thresholds.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Live executions older than this are presumed hung.
    pub stale_after: Duration,
    /// How far back the finished-resource job looks.
    pub finished_window: Duration,
    /// Failed executions older than this get their resources removed.
    pub failed_retention: Duration,
    /// Maximum candidates handled per run.
    pub batch_size: i64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(3 * 24 * 3600),       // 3 days
            finished_window: Duration::from_secs(24 * 3600),       // 24 hours
            failed_retention: Duration::from_secs(14 * 24 * 3600), // 14 days
            batch_size: 500,
        }
    }
}

impl SweepConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `GEOFLOW_SWEEP_STALE_AFTER_HOURS` (default: 72)
    /// - `GEOFLOW_SWEEP_FINISHED_WINDOW_HOURS` (default: 24)
    /// - `GEOFLOW_SWEEP_FAILED_RETENTION_DAYS` (default: 14)
    /// - `GEOFLOW_SWEEP_BATCH_SIZE` (default: 500)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let stale_after = std::env::var("GEOFLOW_SWEEP_STALE_AFTER_HOURS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(hours)
            .unwrap_or(defaults.stale_after);

        let finished_window = std::env::var("GEOFLOW_SWEEP_FINISHED_WINDOW_HOURS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(hours)
            .unwrap_or(defaults.finished_window);

        let failed_retention = std::env::var("GEOFLOW_SWEEP_FAILED_RETENTION_DAYS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(days)
            .unwrap_or(defaults.failed_retention);

        let batch_size = std::env::var("GEOFLOW_SWEEP_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.batch_size);

        Self {
            stale_after,
            finished_window,
            failed_retention,
            batch_size,
        }
    }
}

/// Summary of one sweep run.
#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    /// Which job ran.
    pub kind: SweepKind,
    /// Executions selected by the job's criterion.
    pub candidates: usize,
    /// Executions moved to `FAILED` (stale job only).
    pub transitioned: usize,
    /// Services/containers actually removed.
    pub removed: usize,
    /// Candidates with nothing left to remove.
    pub already_absent: usize,
    /// Per-candidate failures.
    pub warnings: Vec<String>,
}

impl SweepReport {
    fn new(kind: SweepKind, candidates: usize) -> Self {
        Self {
            kind,
            candidates,
            transitioned: 0,
            removed: 0,
            already_absent: 0,
            warnings: Vec::new(),
        }
    }
}

/// Runs sweep jobs against the store and the orchestrator.
#[derive(Clone)]
pub struct Sweeper {
    pool: PgPool,
    orchestrator: Arc<dyn Orchestrator>,
    config: SweepConfig,
}

impl Sweeper {
    /// Create a new sweeper.
    pub fn new(pool: PgPool, orchestrator: Arc<dyn Orchestrator>, config: SweepConfig) -> Self {
        Self {
            pool,
            orchestrator,
            config,
        }
    }

    /// Get the sweep configuration.
    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Run one sweep job to completion.
    pub async fn run(&self, kind: SweepKind) -> Result<SweepReport> {
        let candidates = self.select(kind).await?;
        let mut report = SweepReport::new(kind, candidates.len());

        if candidates.is_empty() {
            debug!(sweep = %kind, "No sweep candidates");
            return Ok(report);
        }

        for execution in &candidates {
            self.sweep_one(kind, execution, &mut report).await;
        }

        info!(
            sweep = %kind,
            candidates = report.candidates,
            transitioned = report.transitioned,
            removed = report.removed,
            already_absent = report.already_absent,
            warnings = report.warnings.len(),
            "Sweep completed"
        );

        Ok(report)
    }

    async fn select(&self, kind: SweepKind) -> Result<Vec<Execution>> {
        let limit = self.config.batch_size;
        let now = Utc::now();

        match kind {
            SweepKind::StaleExecutions => {
                db::stale_candidates(&self.pool, now - to_chrono(self.config.stale_after)?, limit)
                    .await
            }
            SweepKind::FinishedResources => {
                db::recently_finished(
                    &self.pool,
                    now - to_chrono(self.config.finished_window)?,
                    limit,
                )
                .await
            }
            SweepKind::OldFailedResources => {
                db::old_failed(
                    &self.pool,
                    now - to_chrono(self.config.failed_retention)?,
                    limit,
                )
                .await
            }
        }
    }

    /// Handle one selected candidate. `execution` is the row as it was selected.
    async fn sweep_one(&self, kind: SweepKind, execution: &Execution, report: &mut SweepReport) {
        if kind == SweepKind::StaleExecutions && !self.fail_stale(execution, report).await {
            return;
        }
        self.remove_resources(execution.id, report).await;
    }

    /// Force-fail a stale execution. Returns false if the candidate should be skipped.
    async fn fail_stale(&self, execution: &Execution, report: &mut SweepReport) -> bool {
        match transition(&self.pool, execution.id, ExecutionStatus::Failed).await {
            Ok(_) => {
                report.transitioned += 1;
                warn!(
                    execution_id = %execution.id,
                    from = %execution.status,
                    start_date = ?execution.start_date,
                    "Stale execution marked as failed"
                );
                let message = format!(
                    "Execution marked as FAILED: no terminal status after {} hours",
                    self.config.stale_after.as_secs() / 3600
                );
                if let Err(e) = db::append_log(&self.pool, execution.id, "ERROR", &message).await {
                    report
                        .warnings
                        .push(format!("{}: could not append log line: {}", execution.id, e));
                }
                true
            }
            // Reached a terminal status since selection; its service may still linger.
            Err(Error::InvalidState { from, .. }) => {
                debug!(
                    execution_id = %execution.id,
                    status = %from,
                    "Stale candidate already terminal"
                );
                report
                    .warnings
                    .push(format!("{}: already {}, not transitioned", execution.id, from));
                true
            }
            Err(e) => {
                warn!(
                    execution_id = %execution.id,
                    error = %e,
                    "Failed to transition stale execution"
                );
                report
                    .warnings
                    .push(format!("{}: transition failed: {}", execution.id, e));
                false
            }
        }
    }

    async fn remove_resources(&self, execution_id: Uuid, report: &mut SweepReport) {
        match self.orchestrator.stop_and_remove(execution_id).await {
            Ok(RemovalOutcome::Removed) => report.removed += 1,
            Ok(RemovalOutcome::AlreadyAbsent) => report.already_absent += 1,
            Err(e) => {
                warn!(
                    execution_id = %execution_id,
                    error = %e,
                    "Failed to remove execution service during sweep"
                );
                report
                    .warnings
                    .push(format!("{}: removal failed: {}", execution_id, e));
            }
        }
    }
}

fn hours(h: u64) -> Duration {
    Duration::from_secs(h.saturating_mul(3600))
}

fn days(d: u64) -> Duration {
    Duration::from_secs(d.saturating_mul(24 * 3600))
}

fn to_chrono(duration: Duration) -> Result<chrono::Duration> {
    chrono::Duration::from_std(duration)
        .map_err(|_| Error::Other(format!("sweep threshold out of range: {:?}", duration)))
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::models::NewExecution;
    use crate::orchestrator::{MockOrchestrator, OrchestratorCall};

    async fn test_pool() -> Option<PgPool> {
        let url = std::env::var("TEST_GEOFLOW_DATABASE_URL").ok()?;
        let pool = PgPool::connect(&url).await.ok()?;
        crate::migrations::run(&pool).await.ok()?;
        Some(pool)
    }

    #[tokio::test]
    async fn test_stale_candidate_finished_after_selection() {
        let Some(pool) = test_pool().await else {
            eprintln!("Skipping test: TEST_GEOFLOW_DATABASE_URL not set");
            return;
        };

        let created = db::create_execution(
            &pool,
            &NewExecution {
                script_id: Uuid::new_v4(),
                user_id: Uuid::new_v4(),
                params: serde_json::json!({}),
            },
        )
        .await
        .unwrap();
        transition(&pool, created.id, ExecutionStatus::Running)
            .await
            .unwrap();
        let selected = db::get_execution(&pool, created.id).await.unwrap().unwrap();

        // The script finishes between selection and the sweep reaching it
        transition(&pool, created.id, ExecutionStatus::Finished)
            .await
            .unwrap();

        let orchestrator = Arc::new(MockOrchestrator::new());
        orchestrator.insert_service(created.id, "scripts/ndvi:1").await;
        let sweeper = Sweeper::new(pool.clone(), orchestrator.clone(), SweepConfig::default());

        let mut report = SweepReport::new(SweepKind::StaleExecutions, 1);
        sweeper
            .sweep_one(SweepKind::StaleExecutions, &selected, &mut report)
            .await;

        assert_eq!(report.transitioned, 0);
        assert_eq!(report.removed, 1);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("already FINISHED"));
        assert_eq!(
            orchestrator.calls_for(created.id).await,
            vec![OrchestratorCall::StopAndRemove(created.id)]
        );

        let after = db::get_execution(&pool, created.id).await.unwrap().unwrap();
        assert_eq!(after.status, ExecutionStatus::Finished);
    }

    #[test]
    fn test_default_thresholds() {
        let config = SweepConfig::default();
        assert_eq!(config.stale_after, Duration::from_secs(259_200));
        assert_eq!(config.finished_window, Duration::from_secs(86_400));
        assert_eq!(config.failed_retention, Duration::from_secs(1_209_600));
        assert!(config.batch_size > 0);
    }

    #[test]
    fn test_sweep_kind_names() {
        let names: Vec<_> = SweepKind::ALL.iter().map(|k| k.to_string()).collect();
        assert_eq!(
            names,
            vec!["stale_executions", "finished_resources", "old_failed_resources"]
        );
        assert_eq!(
            serde_json::to_value(SweepKind::OldFailedResources).unwrap(),
            serde_json::json!("old_failed_resources")
        );
    }

    #[test]
    fn test_env_units_saturate() {
        assert_eq!(hours(72), Duration::from_secs(259_200));
        assert_eq!(days(14), Duration::from_secs(1_209_600));
        assert_eq!(hours(u64::MAX), Duration::from_secs(u64::MAX));
        assert_eq!(days(u64::MAX), Duration::from_secs(u64::MAX));
        assert!(to_chrono(days(u64::MAX)).is_err());
    }

    #[test]
    fn test_to_chrono_rejects_overflow() {
        assert!(to_chrono(Duration::from_secs(3600)).is_ok());
        assert!(to_chrono(Duration::MAX).is_err());
    }
}
