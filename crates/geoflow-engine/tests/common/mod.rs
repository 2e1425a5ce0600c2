// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for geoflow-engine integration tests.
//!
//! Tests need a PostgreSQL database in `TEST_GEOFLOW_DATABASE_URL`; without it
//! they print a notice and return early.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use geoflow_engine::db;
use geoflow_engine::models::{Execution, ExecutionStatus, NewExecution};

/// Skip the test if no database URL is configured.
macro_rules! skip_if_no_db {
    () => {
        if std::env::var("TEST_GEOFLOW_DATABASE_URL").is_err() {
            eprintln!("Skipping test: TEST_GEOFLOW_DATABASE_URL not set");
            return;
        }
    };
}

/// Connect to the test database and apply migrations.
pub async fn get_test_pool() -> Option<PgPool> {
    let database_url = std::env::var("TEST_GEOFLOW_DATABASE_URL").ok()?;
    let pool = PgPool::connect(&database_url).await.ok()?;
    geoflow_engine::migrations::run(&pool).await.ok()?;
    Some(pool)
}

/// Create a `PENDING` execution through the store.
pub async fn create_pending(pool: &PgPool, user_id: Uuid) -> Execution {
    db::create_execution(
        pool,
        &NewExecution {
            script_id: Uuid::new_v4(),
            user_id,
            params: serde_json::json!({ "aoi": "test" }),
        },
    )
    .await
    .expect("Failed to create execution")
}

/// Insert a non-terminal execution with an explicit start date, bypassing transitions.
pub async fn insert_live(
    pool: &PgPool,
    user_id: Uuid,
    status: ExecutionStatus,
    start_date: DateTime<Utc>,
) -> Uuid {
    assert!(!status.is_terminal());
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO executions (id, script_id, user_id, status, progress, start_date)
        VALUES ($1, $2, $3, $4, 10, $5)
        "#,
    )
    .bind(id)
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(status.as_str())
    .bind(start_date)
    .execute(pool)
    .await
    .expect("Failed to insert live execution");
    id
}

/// Insert a terminal execution with an explicit end date, bypassing transitions.
pub async fn insert_terminal(
    pool: &PgPool,
    user_id: Uuid,
    status: ExecutionStatus,
    end_date: DateTime<Utc>,
) -> Uuid {
    assert!(status.is_terminal());
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO executions (id, script_id, user_id, status, progress, start_date, end_date)
        VALUES ($1, $2, $3, $4, 100, $5 - INTERVAL '1 hour', $5)
        "#,
    )
    .bind(id)
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(status.as_str())
    .bind(end_date)
    .execute(pool)
    .await
    .expect("Failed to insert terminal execution");
    id
}

/// Reload an execution, panicking if it is gone.
pub async fn reload(pool: &PgPool, id: Uuid) -> Execution {
    db::get_execution(pool, id)
        .await
        .expect("Failed to load execution")
        .expect("Execution missing")
}

/// Number of status-log rows recorded for an execution.
pub async fn status_log_count(pool: &PgPool, id: Uuid) -> i64 {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM status_logs WHERE execution_id = $1")
            .bind(id)
            .fetch_one(pool)
            .await
            .expect("Failed to count status logs");
    count
}
