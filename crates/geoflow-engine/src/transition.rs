// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Status transition handler.
//!
//! The only writer of an execution's `status`, `progress` and `end_date`.
//! Every successful [`transition`] runs as one transaction:
//!
//! 1. lock the execution row (`FOR UPDATE`)
//! 2. validate the move from the current status
//! 3. write the new status (terminal ⇒ `end_date = now`, `progress = 100`)
//! 4. recompute the per-status counts, including this write
//! 5. append exactly one `status_logs` row
//! 6. commit
//!
//! Any failure drops the transaction, so the execution keeps its previous
//! status and no status-log row is left behind. Concurrent transitions on the
//! same execution are serialized by the row lock; the loser observes the new
//! status and is rejected with [`Error::InvalidState`].

use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::db;
use crate::error::{Error, Result};
use crate::models::{Execution, ExecutionStatus, StatusLog};

/// Move an execution to `new_status` and record the transition.
pub async fn transition(
    pool: &PgPool,
    execution_id: Uuid,
    new_status: ExecutionStatus,
) -> Result<StatusLog> {
    let mut tx = pool.begin().await?;

    let current = db::lock_execution(&mut *tx, execution_id)
        .await?
        .ok_or(Error::NotFound(execution_id))?;

    if !current.status.can_transition_to(new_status) {
        debug!(
            execution_id = %execution_id,
            from = %current.status,
            to = %new_status,
            "Rejected status transition"
        );
        return Err(Error::InvalidState {
            execution_id,
            from: current.status,
            to: new_status,
        });
    }

    db::write_status(&mut *tx, execution_id, new_status).await?;
    let counts = db::count_by_status(&mut *tx).await?;
    let log =
        db::insert_status_log(&mut *tx, execution_id, current.status, new_status, &counts).await?;

    tx.commit().await?;

    info!(
        execution_id = %execution_id,
        from = %current.status,
        to = %new_status,
        status_log_id = log.id,
        active = counts.active,
        running = counts.running,
        "Execution status changed"
    );

    Ok(log)
}

/// Record progress reported by a running execution.
///
/// Progress is clamped to `0..=100`. Terminal executions keep their forced
/// 100 and the report is rejected. No status-log row is written.
pub async fn report_progress(
    pool: &PgPool,
    execution_id: Uuid,
    progress: i32,
) -> Result<Execution> {
    let mut tx = pool.begin().await?;

    let current = db::lock_execution(&mut *tx, execution_id)
        .await?
        .ok_or(Error::NotFound(execution_id))?;

    if current.status.is_terminal() {
        return Err(Error::InvalidState {
            execution_id,
            from: current.status,
            to: current.status,
        });
    }

    let updated = db::write_progress(&mut *tx, execution_id, progress.clamp(0, 100)).await?;
    tx.commit().await?;

    debug!(
        execution_id = %execution_id,
        progress = updated.progress,
        "Execution progress updated"
    );

    Ok(updated)
}
