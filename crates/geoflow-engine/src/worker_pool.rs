// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Worker pool for orchestrator-bound jobs.
//!
//! Container starts, cancellations and sweeps all block on the container
//! platform, so they run here instead of on the caller's task. A bounded
//! queue feeds a fixed number of tokio worker tasks; a full queue applies
//! backpressure to [`WorkerPool::submit`].
//!
//! Jobs on different executions run concurrently. Jobs on the same
//! execution are serialized only by the row lock taken in
//! [`transition`](crate::transition::transition).

use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cancellation::{CancelOutcome, CancellationCoordinator};
use crate::db;
use crate::error::{Error, Result};
use crate::models::{ExecutionStatus, Requester};
use crate::orchestrator::{Orchestrator, ResourceSpec};
use crate::sweeper::{SweepKind, Sweeper};
use crate::transition::transition;

/// Request to start the container of a `PENDING` execution.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    /// Execution to launch.
    pub execution_id: Uuid,
    /// Script image reference.
    pub image_ref: String,
    /// Resource reservation/limits from the script's metadata.
    pub resources: ResourceSpec,
}

/// A unit of work for the pool.
#[derive(Debug)]
pub enum Job {
    /// Start an execution's container.
    Launch(LaunchRequest),
    /// Cancel an execution and send the outcome back.
    Cancel {
        /// Execution to cancel.
        execution_id: Uuid,
        /// Authenticated caller.
        requester: Requester,
        /// Where the outcome is delivered.
        reply: oneshot::Sender<Result<CancelOutcome>>,
    },
    /// Run one sweep job.
    Sweep(SweepKind),
}

impl Job {
    fn name(&self) -> &'static str {
        match self {
            Job::Launch(_) => "launch",
            Job::Cancel { .. } => "cancel",
            Job::Sweep(_) => "sweep",
        }
    }
}

/// Everything a worker needs to run jobs.
pub struct WorkerState {
    pool: PgPool,
    orchestrator: Arc<dyn Orchestrator>,
    coordinator: CancellationCoordinator,
    sweeper: Sweeper,
}

impl WorkerState {
    /// Create worker state.
    pub fn new(
        pool: PgPool,
        orchestrator: Arc<dyn Orchestrator>,
        coordinator: CancellationCoordinator,
        sweeper: Sweeper,
    ) -> Self {
        Self {
            pool,
            orchestrator,
            coordinator,
            sweeper,
        }
    }

    async fn handle(&self, job: Job) {
        match job {
            Job::Launch(request) => self.launch(request).await,
            Job::Cancel {
                execution_id,
                requester,
                reply,
            } => {
                let result = self.coordinator.cancel(execution_id, &requester).await;
                if reply.send(result).is_err() {
                    debug!(execution_id = %execution_id, "Cancel requester went away");
                }
            }
            Job::Sweep(kind) => {
                if let Err(e) = self.sweeper.run(kind).await {
                    error!(sweep = %kind, error = %e, "Sweep failed");
                }
            }
        }
    }

    /// Start the container; a failed start fails the execution.
    async fn launch(&self, request: LaunchRequest) {
        let execution_id = request.execution_id;

        if let Err(e) = self
            .orchestrator
            .start(execution_id, &request.image_ref, &request.resources)
            .await
        {
            error!(
                execution_id = %execution_id,
                image = %request.image_ref,
                error = %e,
                "Failed to start execution container"
            );

            let message = format!("Failed to start container: {}", e);
            if let Err(e) = db::append_log(&self.pool, execution_id, "ERROR", &message).await {
                warn!(execution_id = %execution_id, error = %e, "Failed to append launch error");
            }
            match transition(&self.pool, execution_id, ExecutionStatus::Failed).await {
                Ok(_) | Err(Error::InvalidState { .. }) => {}
                Err(e) => {
                    error!(
                        execution_id = %execution_id,
                        error = %e,
                        "Failed to mark execution as failed after launch error"
                    );
                }
            }
            return;
        }

        match transition(&self.pool, execution_id, ExecutionStatus::Ready).await {
            Ok(_) => {}
            // Cancelled while the container was being created
            Err(Error::InvalidState { from, .. }) if from.is_terminal() => {
                info!(
                    execution_id = %execution_id,
                    status = %from,
                    "Execution ended during launch, removing container"
                );
                if let Err(e) = self.orchestrator.stop_and_remove(execution_id).await {
                    warn!(
                        execution_id = %execution_id,
                        error = %e,
                        "Failed to remove container of ended execution"
                    );
                }
            }
            // The script already reported progress past READY
            Err(Error::InvalidState { .. }) => {}
            Err(e) => {
                warn!(
                    execution_id = %execution_id,
                    error = %e,
                    "Failed to mark launched execution as ready"
                );
            }
        }
    }
}

/// Fixed-size pool of tokio worker tasks behind a bounded queue.
pub struct WorkerPool {
    sender: mpsc::Sender<Job>,
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `workers` worker tasks sharing a queue of `queue_depth` jobs.
    pub fn start(state: Arc<WorkerState>, workers: usize, queue_depth: usize) -> Self {
        let workers = workers.max(1);
        let (sender, receiver) = mpsc::channel(queue_depth.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handles = (0..workers)
            .map(|worker_id| {
                tokio::spawn(run_worker(
                    worker_id,
                    state.clone(),
                    receiver.clone(),
                    shutdown_rx.clone(),
                ))
            })
            .collect();

        info!(workers, queue_depth, "Worker pool started");

        Self {
            sender,
            shutdown_tx,
            handles,
        }
    }

    /// Queue a job, waiting while the queue is full.
    pub async fn submit(&self, job: Job) -> Result<()> {
        self.sender.send(job).await.map_err(|_| Error::PoolClosed)
    }

    /// Handle for submitting jobs from other tasks.
    pub fn handle(&self) -> WorkerPoolHandle {
        WorkerPoolHandle {
            sender: self.sender.clone(),
        }
    }

    /// Queue a launch.
    pub async fn launch(&self, request: LaunchRequest) -> Result<()> {
        self.submit(Job::Launch(request)).await
    }

    /// Cancel an execution on a worker and wait for the outcome.
    pub async fn cancel(&self, execution_id: Uuid, requester: Requester) -> Result<CancelOutcome> {
        self.handle().cancel(execution_id, requester).await
    }

    /// Stop the workers after their current job and wait for them.
    ///
    /// Jobs still queued are dropped; pending cancel callers receive
    /// [`Error::PoolClosed`].
    pub async fn shutdown(self) {
        info!("Worker pool shutting down...");
        let _ = self.shutdown_tx.send(true);

        for handle in self.handles {
            if let Err(e) = handle.await {
                error!("Worker task panicked: {}", e);
            }
        }

        info!("Worker pool stopped");
    }
}

/// Cloneable submit-only handle to a [`WorkerPool`].
#[derive(Clone)]
pub struct WorkerPoolHandle {
    sender: mpsc::Sender<Job>,
}

impl WorkerPoolHandle {
    #[cfg(test)]
    pub(crate) fn detached(queue_depth: usize) -> (Self, mpsc::Receiver<Job>) {
        let (sender, receiver) = mpsc::channel(queue_depth);
        (Self { sender }, receiver)
    }

    /// Queue a job, waiting while the queue is full.
    pub async fn submit(&self, job: Job) -> Result<()> {
        self.sender.send(job).await.map_err(|_| Error::PoolClosed)
    }

    /// Queue a job without waiting; fails if the queue is full or closed.
    pub fn try_submit(&self, job: Job) -> Result<()> {
        self.sender.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(job) => {
                Error::Other(format!("worker queue full, {} job dropped", job.name()))
            }
            mpsc::error::TrySendError::Closed(_) => Error::PoolClosed,
        })
    }

    /// Cancel an execution on a worker and wait for the outcome.
    pub async fn cancel(&self, execution_id: Uuid, requester: Requester) -> Result<CancelOutcome> {
        let (reply, rx) = oneshot::channel();
        self.submit(Job::Cancel {
            execution_id,
            requester,
            reply,
        })
        .await?;
        rx.await.map_err(|_| Error::PoolClosed)?
    }
}

async fn run_worker(
    worker_id: usize,
    state: Arc<WorkerState>,
    receiver: Arc<Mutex<mpsc::Receiver<Job>>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    debug!(worker_id, "Worker started");

    loop {
        let job = {
            let mut receiver = receiver.lock().await;
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => None,
                job = receiver.recv() => job,
            }
        };

        let Some(job) = job else {
            break;
        };

        debug!(worker_id, job = job.name(), "Worker picked up job");
        state.handle(job).await;
    }

    debug!(worker_id, "Worker stopped");
}
