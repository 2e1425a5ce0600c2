// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable runtime for geoflow-engine.
//!
//! [`EngineRuntime`] wires the worker pool and the sweep scheduler together so
//! the engine can run inside an existing tokio application (typically the API
//! server) or as the standalone `geoflow-engine` binary.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use geoflow_engine::orchestrator::DockerOrchestrator;
//! use geoflow_engine::runtime::EngineRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pool = sqlx::PgPool::connect("postgres://...").await?;
//!
//!     let runtime = EngineRuntime::builder()
//!         .pool(pool)
//!         .orchestrator(Arc::new(DockerOrchestrator::from_env()))
//!         .workers(8)
//!         .build()?
//!         .start()
//!         .await?;
//!
//!     // runtime.launch(..), runtime.cancel(..)
//!
//!     runtime.shutdown().await;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use anyhow::Result;
use sqlx::PgPool;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

use crate::cancellation::{CancelOutcome, CancellationCoordinator};
use crate::db;
use crate::models::Requester;
use crate::orchestrator::Orchestrator;
use crate::remote::{DisabledRemoteCompute, RemoteCompute};
use crate::scheduler::{ScheduleConfig, SweepScheduler};
use crate::sweeper::{SweepConfig, Sweeper};
use crate::worker_pool::{LaunchRequest, WorkerPool, WorkerPoolHandle, WorkerState};

/// Builder for creating an [`EngineRuntime`].
pub struct EngineRuntimeBuilder {
    pool: Option<PgPool>,
    orchestrator: Option<Arc<dyn Orchestrator>>,
    remote: Arc<dyn RemoteCompute>,
    workers: usize,
    queue_depth: usize,
    sweep: SweepConfig,
    schedule: ScheduleConfig,
    scheduler_enabled: bool,
}

impl Default for EngineRuntimeBuilder {
    fn default() -> Self {
        Self {
            pool: None,
            orchestrator: None,
            remote: Arc::new(DisabledRemoteCompute),
            workers: 4,
            queue_depth: 256,
            sweep: SweepConfig::default(),
            schedule: ScheduleConfig::default(),
            scheduler_enabled: true,
        }
    }
}

impl EngineRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the PostgreSQL connection pool (required).
    pub fn pool(mut self, pool: PgPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Set the container orchestrator (required).
    pub fn orchestrator(mut self, orchestrator: Arc<dyn Orchestrator>) -> Self {
        self.orchestrator = Some(orchestrator);
        self
    }

    /// Set the remote compute client.
    ///
    /// Default: [`DisabledRemoteCompute`]
    pub fn remote(mut self, remote: Arc<dyn RemoteCompute>) -> Self {
        self.remote = remote;
        self
    }

    /// Set the number of worker tasks.
    ///
    /// Default: 4
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the job queue depth.
    ///
    /// Default: 256
    pub fn queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth;
        self
    }

    /// Set the sweep thresholds.
    pub fn sweep_config(mut self, config: SweepConfig) -> Self {
        self.sweep = config;
        self
    }

    /// Set the sweep cadences.
    pub fn schedule_config(mut self, config: ScheduleConfig) -> Self {
        self.schedule = config;
        self
    }

    /// Enable or disable the sweep scheduler.
    ///
    /// Default: enabled
    pub fn scheduler_enabled(mut self, enabled: bool) -> Self {
        self.scheduler_enabled = enabled;
        self
    }

    /// Build the runtime configuration.
    ///
    /// Returns an error if required fields are missing.
    pub fn build(self) -> Result<EngineRuntimeConfig> {
        let pool = self
            .pool
            .ok_or_else(|| anyhow::anyhow!("pool is required"))?;
        let orchestrator = self
            .orchestrator
            .ok_or_else(|| anyhow::anyhow!("orchestrator is required"))?;
        if self.workers == 0 {
            anyhow::bail!("workers must be at least 1");
        }

        Ok(EngineRuntimeConfig {
            pool,
            orchestrator,
            remote: self.remote,
            workers: self.workers,
            queue_depth: self.queue_depth,
            sweep: self.sweep,
            schedule: self.schedule,
            scheduler_enabled: self.scheduler_enabled,
        })
    }
}

/// Configuration for an [`EngineRuntime`].
pub struct EngineRuntimeConfig {
    pool: PgPool,
    orchestrator: Arc<dyn Orchestrator>,
    remote: Arc<dyn RemoteCompute>,
    workers: usize,
    queue_depth: usize,
    sweep: SweepConfig,
    schedule: ScheduleConfig,
    scheduler_enabled: bool,
}

impl EngineRuntimeConfig {
    /// Start the runtime, spawning the worker pool and sweep scheduler.
    pub async fn start(self) -> Result<EngineRuntime> {
        db::health_check(&self.pool).await?;

        let coordinator = CancellationCoordinator::new(
            self.pool.clone(),
            self.orchestrator.clone(),
            self.remote.clone(),
        );
        let sweeper = Sweeper::new(self.pool.clone(), self.orchestrator.clone(), self.sweep);
        let state = Arc::new(WorkerState::new(
            self.pool.clone(),
            self.orchestrator.clone(),
            coordinator,
            sweeper,
        ));

        let workers = WorkerPool::start(state, self.workers, self.queue_depth);

        let scheduler = if self.scheduler_enabled {
            let scheduler = SweepScheduler::new(workers.handle(), self.schedule);
            let shutdown = scheduler.shutdown_handle();
            let handle = tokio::spawn(async move {
                scheduler.run().await;
            });
            Some((handle, shutdown))
        } else {
            None
        };

        info!(
            orchestrator = self.orchestrator.orchestrator_type(),
            workers = self.workers,
            scheduler = scheduler.is_some(),
            "EngineRuntime started"
        );

        Ok(EngineRuntime {
            pool: self.pool,
            workers,
            scheduler,
        })
    }
}

/// A running engine: worker pool plus optional sweep scheduler.
///
/// Call [`shutdown`](Self::shutdown) for graceful termination.
pub struct EngineRuntime {
    pool: PgPool,
    workers: WorkerPool,
    scheduler: Option<(JoinHandle<()>, Arc<Notify>)>,
}

impl EngineRuntime {
    /// Create a new builder for configuring the runtime.
    pub fn builder() -> EngineRuntimeBuilder {
        EngineRuntimeBuilder::new()
    }

    /// Get the database pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Handle for submitting jobs from other tasks.
    pub fn jobs(&self) -> WorkerPoolHandle {
        self.workers.handle()
    }

    /// Queue the container start of a `PENDING` execution.
    pub async fn launch(&self, request: LaunchRequest) -> crate::error::Result<()> {
        self.workers.launch(request).await
    }

    /// Cancel an execution on a worker and wait for the outcome.
    pub async fn cancel(
        &self,
        execution_id: Uuid,
        requester: Requester,
    ) -> crate::error::Result<CancelOutcome> {
        self.workers.cancel(execution_id, requester).await
    }

    /// Gracefully shut down the runtime.
    ///
    /// Stops the scheduler first so no new sweeps are queued, then lets the
    /// workers finish their current job.
    pub async fn shutdown(self) {
        info!("EngineRuntime shutting down...");

        if let Some((handle, shutdown)) = self.scheduler {
            shutdown.notify_one();
            if let Err(e) = handle.await {
                error!("Sweep scheduler task panicked: {}", e);
            }
        }

        self.workers.shutdown().await;

        info!("EngineRuntime shutdown complete");
    }

    /// Check if the scheduler is still running.
    pub fn is_running(&self) -> bool {
        self.scheduler
            .as_ref()
            .is_none_or(|(handle, _)| !handle.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::MockOrchestrator;
    use std::time::Duration;

    #[test]
    fn test_builder_default_values() {
        let builder = EngineRuntimeBuilder::default();

        assert!(builder.pool.is_none());
        assert!(builder.orchestrator.is_none());
        assert_eq!(builder.workers, 4);
        assert_eq!(builder.queue_depth, 256);
        assert!(builder.scheduler_enabled);
        assert_eq!(builder.schedule.stale_interval, Duration::from_secs(3600));
    }

    #[test]
    fn test_builder_setters() {
        let builder = EngineRuntimeBuilder::new()
            .workers(16)
            .queue_depth(8)
            .scheduler_enabled(false)
            .orchestrator(Arc::new(MockOrchestrator::new()));

        assert_eq!(builder.workers, 16);
        assert_eq!(builder.queue_depth, 8);
        assert!(!builder.scheduler_enabled);
        assert!(builder.orchestrator.is_some());
    }

    #[test]
    fn test_build_requires_pool() {
        let result = EngineRuntimeBuilder::new()
            .orchestrator(Arc::new(MockOrchestrator::new()))
            .build();

        let err = result.err().unwrap();
        assert!(err.to_string().contains("pool is required"));
    }
}
