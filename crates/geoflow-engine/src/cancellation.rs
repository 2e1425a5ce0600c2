// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cancellation coordinator.
//!
//! Cancelling an execution:
//!
//! 1. load the execution and authorize the requester (owner or admin)
//! 2. reject terminal executions before touching the platform
//! 3. stop and remove the execution's service/container
//! 4. extract remote task IDs from the accumulated log text
//! 5. request cancellation of each remote task
//! 6. transition the execution to `CANCELLED`
//!
//! Steps 3-5 are best effort: failures become warnings on the outcome and a
//! later sweep retries the removal. Only a failure of step 6 fails the whole
//! operation.

use std::sync::Arc;

use serde::Serialize;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db;
use crate::error::{Error, Result};
use crate::models::{Execution, ExecutionStatus, Requester};
use crate::orchestrator::Orchestrator;
use crate::remote::RemoteCompute;
use crate::task_ids::extract_task_ids;
use crate::transition::transition;

/// Result of a cancellation that reached `CANCELLED`.
#[derive(Debug, Clone, Serialize)]
pub struct CancelOutcome {
    /// The execution after the transition.
    pub execution: Execution,
    /// Whether the service/container is known to be gone.
    pub container_removed: bool,
    /// Remote task IDs whose cancellation was accepted.
    pub remote_tasks_cancelled: Vec<String>,
    /// Non-fatal cleanup failures.
    pub warnings: Vec<String>,
}

impl CancelOutcome {
    /// True when every cleanup step succeeded.
    pub fn is_complete(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Coordinates container teardown, remote task cancellation and the final
/// status transition.
#[derive(Clone)]
pub struct CancellationCoordinator {
    pool: PgPool,
    orchestrator: Arc<dyn Orchestrator>,
    remote: Arc<dyn RemoteCompute>,
}

impl CancellationCoordinator {
    /// Create a new coordinator.
    pub fn new(
        pool: PgPool,
        orchestrator: Arc<dyn Orchestrator>,
        remote: Arc<dyn RemoteCompute>,
    ) -> Self {
        Self {
            pool,
            orchestrator,
            remote,
        }
    }

    /// Cancel an execution on behalf of `requester`.
    ///
    /// Fails with [`Error::NotFound`], [`Error::Forbidden`] or
    /// [`Error::InvalidState`] before any platform call is made. Once
    /// cleanup has started, only the final transition can fail the call.
    pub async fn cancel(&self, execution_id: Uuid, requester: &Requester) -> Result<CancelOutcome> {
        let execution = db::get_execution(&self.pool, execution_id)
            .await?
            .ok_or(Error::NotFound(execution_id))?;

        if !requester.can_manage(&execution) {
            warn!(
                execution_id = %execution_id,
                user_id = %requester.user_id,
                "Cancellation denied"
            );
            return Err(Error::Forbidden {
                execution_id,
                user_id: requester.user_id,
            });
        }

        if execution.status.is_terminal() {
            return Err(Error::InvalidState {
                execution_id,
                from: execution.status,
                to: ExecutionStatus::Cancelled,
            });
        }

        info!(
            execution_id = %execution_id,
            status = %execution.status,
            user_id = %requester.user_id,
            "Cancelling execution"
        );

        let mut warnings = Vec::new();

        let container_removed = match self.orchestrator.stop_and_remove(execution_id).await {
            Ok(outcome) => {
                info!(
                    execution_id = %execution_id,
                    outcome = ?outcome,
                    "Execution container stopped"
                );
                true
            }
            Err(e) => {
                warn!(
                    execution_id = %execution_id,
                    error = %e,
                    "Failed to stop execution container, leaving it to the sweeper"
                );
                warnings.push(format!("container removal failed: {}", e));
                false
            }
        };

        let remote_tasks_cancelled = self.cancel_remote_tasks(execution_id, &mut warnings).await;

        transition(&self.pool, execution_id, ExecutionStatus::Cancelled).await?;

        let execution = db::get_execution(&self.pool, execution_id)
            .await?
            .ok_or(Error::NotFound(execution_id))?;

        info!(
            execution_id = %execution_id,
            container_removed,
            remote_tasks_cancelled = remote_tasks_cancelled.len(),
            warnings = warnings.len(),
            "Execution cancelled"
        );

        Ok(CancelOutcome {
            execution,
            container_removed,
            remote_tasks_cancelled,
            warnings,
        })
    }

    /// Best-effort cancellation of remote tasks named in the execution's logs.
    async fn cancel_remote_tasks(
        &self,
        execution_id: Uuid,
        warnings: &mut Vec<String>,
    ) -> Vec<String> {
        let log_text = match db::log_text(&self.pool, execution_id).await {
            Ok(text) => text,
            Err(e) => {
                warn!(execution_id = %execution_id, error = %e, "Failed to read execution logs");
                warnings.push(format!("could not read logs for remote tasks: {}", e));
                return Vec::new();
            }
        };

        let mut cancelled = Vec::new();
        for task_id in extract_task_ids(&log_text) {
            match self.remote.cancel_task(&task_id).await {
                Ok(()) => cancelled.push(task_id),
                Err(e) => {
                    warn!(
                        execution_id = %execution_id,
                        task_id = %task_id,
                        error = %e,
                        "Failed to cancel remote task"
                    );
                    warnings.push(format!("remote task {} not cancelled: {}", task_id, e));
                }
            }
        }
        cancelled
    }
}
