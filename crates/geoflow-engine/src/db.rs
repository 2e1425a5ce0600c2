// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Database operations for the execution store.
//!
//! Executions, their log lines and the status audit trail live in three
//! tables (`executions`, `execution_logs`, `status_logs`). Functions that
//! take a `PgConnection` are meant to run inside a caller-owned transaction.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    Execution, ExecutionLog, ExecutionRow, ExecutionStatus, NewExecution, StatusCounts, StatusLog,
};

const EXECUTION_COLUMNS: &str =
    "id, script_id, user_id, status, progress, start_date, end_date, params, results";

/// Create a new execution in `PENDING`.
pub async fn create_execution(pool: &PgPool, new: &NewExecution) -> Result<Execution> {
    let row = sqlx::query_as::<_, ExecutionRow>(&format!(
        r#"
        INSERT INTO executions (id, script_id, user_id, status, progress, start_date, params)
        VALUES ($1, $2, $3, 'PENDING', 0, NOW(), $4)
        RETURNING {EXECUTION_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(new.script_id)
    .bind(new.user_id)
    .bind(&new.params)
    .fetch_one(pool)
    .await?;

    row.try_into()
}

/// Get an execution by ID.
pub async fn get_execution(pool: &PgPool, execution_id: Uuid) -> Result<Option<Execution>> {
    let row = sqlx::query_as::<_, ExecutionRow>(&format!(
        "SELECT {EXECUTION_COLUMNS} FROM executions WHERE id = $1"
    ))
    .bind(execution_id)
    .fetch_optional(pool)
    .await?;

    row.map(Execution::try_from).transpose()
}

/// Load an execution and hold its row lock until the transaction ends.
pub async fn lock_execution(
    conn: &mut PgConnection,
    execution_id: Uuid,
) -> Result<Option<Execution>> {
    let row = sqlx::query_as::<_, ExecutionRow>(&format!(
        "SELECT {EXECUTION_COLUMNS} FROM executions WHERE id = $1 FOR UPDATE"
    ))
    .bind(execution_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(Execution::try_from).transpose()
}

/// Persist a new status.
///
/// Terminal statuses stamp `end_date` and force `progress` to 100. Moving to
/// `RUNNING` stamps `start_date` if it was never set.
pub async fn write_status(
    conn: &mut PgConnection,
    execution_id: Uuid,
    status: ExecutionStatus,
) -> Result<Execution> {
    let row = sqlx::query_as::<_, ExecutionRow>(&format!(
        r#"
        UPDATE executions
        SET status = $2,
            progress = CASE WHEN $3 THEN 100 ELSE progress END,
            end_date = CASE WHEN $3 THEN NOW() ELSE end_date END,
            start_date = CASE WHEN $2 = 'RUNNING' AND start_date IS NULL THEN NOW() ELSE start_date END
        WHERE id = $1
        RETURNING {EXECUTION_COLUMNS}
        "#
    ))
    .bind(execution_id)
    .bind(status.as_str())
    .bind(status.is_terminal())
    .fetch_one(&mut *conn)
    .await?;

    row.try_into()
}

/// Persist a new progress value.
pub async fn write_progress(
    conn: &mut PgConnection,
    execution_id: Uuid,
    progress: i32,
) -> Result<Execution> {
    let row = sqlx::query_as::<_, ExecutionRow>(&format!(
        "UPDATE executions SET progress = $2 WHERE id = $1 RETURNING {EXECUTION_COLUMNS}"
    ))
    .bind(execution_id)
    .bind(progress)
    .fetch_one(&mut *conn)
    .await?;

    row.try_into()
}

/// Count executions per status bucket in a single aggregate query.
///
/// Inside a transaction the counts include that transaction's own writes.
pub async fn count_by_status(conn: &mut PgConnection) -> Result<StatusCounts> {
    let counts = sqlx::query_as::<_, StatusCounts>(
        r#"
        SELECT
            COUNT(*) FILTER (WHERE status IN ('RUNNING', 'PENDING')) AS active,
            COUNT(*) FILTER (WHERE status = 'READY') AS ready,
            COUNT(*) FILTER (WHERE status = 'RUNNING') AS running,
            COUNT(*) FILTER (WHERE status = 'FINISHED') AS finished,
            COUNT(*) FILTER (WHERE status = 'FAILED') AS failed,
            COUNT(*) FILTER (WHERE status = 'CANCELLED') AS cancelled
        FROM executions
        "#,
    )
    .fetch_one(&mut *conn)
    .await?;

    Ok(counts)
}

/// Append one status-log row.
pub async fn insert_status_log(
    conn: &mut PgConnection,
    execution_id: Uuid,
    status_from: ExecutionStatus,
    status_to: ExecutionStatus,
    counts: &StatusCounts,
) -> Result<StatusLog> {
    let log = sqlx::query_as::<_, StatusLog>(
        r#"
        INSERT INTO status_logs (
            timestamp, execution_id, status_from, status_to,
            executions_active, executions_ready, executions_running,
            executions_finished, executions_failed, executions_cancelled
        ) VALUES (NOW(), $1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING id, timestamp, execution_id, status_from, status_to,
                  executions_active, executions_ready, executions_running,
                  executions_finished, executions_failed, executions_cancelled
        "#,
    )
    .bind(execution_id)
    .bind(status_from.as_str())
    .bind(status_to.as_str())
    .bind(counts.active)
    .bind(counts.ready)
    .bind(counts.running)
    .bind(counts.finished)
    .bind(counts.failed)
    .bind(counts.cancelled)
    .fetch_one(&mut *conn)
    .await?;

    Ok(log)
}

/// Store the results payload of an execution.
pub async fn set_results(pool: &PgPool, execution_id: Uuid, results: &Value) -> Result<bool> {
    let result = sqlx::query("UPDATE executions SET results = $2 WHERE id = $1")
        .bind(execution_id)
        .bind(results)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Append a log line emitted by an execution.
pub async fn append_log(
    pool: &PgPool,
    execution_id: Uuid,
    level: &str,
    text: &str,
) -> Result<ExecutionLog> {
    let log = sqlx::query_as::<_, ExecutionLog>(
        r#"
        INSERT INTO execution_logs (execution_id, level, text, register_date)
        VALUES ($1, $2, $3, NOW())
        RETURNING id, execution_id, level, text, register_date
        "#,
    )
    .bind(execution_id)
    .bind(level)
    .bind(text)
    .fetch_one(pool)
    .await?;

    Ok(log)
}

/// All log lines of an execution in emission order.
pub async fn list_logs(pool: &PgPool, execution_id: Uuid) -> Result<Vec<ExecutionLog>> {
    let logs = sqlx::query_as::<_, ExecutionLog>(
        r#"
        SELECT id, execution_id, level, text, register_date
        FROM execution_logs
        WHERE execution_id = $1
        ORDER BY id ASC
        "#,
    )
    .bind(execution_id)
    .fetch_all(pool)
    .await?;

    Ok(logs)
}

/// Accumulated log text of an execution, one line per stored entry.
pub async fn log_text(pool: &PgPool, execution_id: Uuid) -> Result<String> {
    let lines = list_logs(pool, execution_id).await?;
    Ok(lines
        .into_iter()
        .map(|l| l.text)
        .collect::<Vec<_>>()
        .join("\n"))
}

/// Non-terminal (`RUNNING` or `PENDING`) executions started before `cutoff`.
pub async fn stale_candidates(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<Execution>> {
    select_executions(
        pool,
        "status IN ('RUNNING', 'PENDING') AND start_date < $1",
        "start_date ASC",
        cutoff,
        limit,
    )
    .await
}

/// `FINISHED` executions whose `end_date` is at or after `since`.
pub async fn recently_finished(
    pool: &PgPool,
    since: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<Execution>> {
    select_executions(
        pool,
        "status = 'FINISHED' AND end_date >= $1",
        "end_date DESC",
        since,
        limit,
    )
    .await
}

/// `FAILED` executions whose `end_date` is before `cutoff`.
pub async fn old_failed(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<Execution>> {
    select_executions(
        pool,
        "status = 'FAILED' AND end_date < $1",
        "end_date ASC",
        cutoff,
        limit,
    )
    .await
}

async fn select_executions(
    pool: &PgPool,
    predicate: &str,
    order: &str,
    bound: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<Execution>> {
    let query = format!(
        "SELECT {EXECUTION_COLUMNS} FROM executions WHERE {predicate} ORDER BY {order} LIMIT $2"
    );

    sqlx::query_as::<_, ExecutionRow>(&query)
        .bind(bound)
        .bind(limit)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(Execution::try_from)
        .collect()
}

/// Health check - verify database connectivity.
pub async fn health_check(pool: &PgPool) -> Result<bool> {
    let row: (i32,) = sqlx::query_as("SELECT 1").fetch_one(pool).await?;
    Ok(row.0 == 1)
}
