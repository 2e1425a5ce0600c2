// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tests for the worker pool and the embeddable runtime.

#[macro_use]
mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::*;
use geoflow_engine::db;
use geoflow_engine::error::Error;
use geoflow_engine::models::{Execution, ExecutionStatus, Requester};
use geoflow_engine::orchestrator::{MockOrchestrator, OrchestratorCall, ResourceSpec};
use geoflow_engine::remote::MockRemoteCompute;
use geoflow_engine::runtime::EngineRuntime;
use geoflow_engine::worker_pool::LaunchRequest;
use sqlx::PgPool;
use uuid::Uuid;

async fn start_runtime(pool: &PgPool, orchestrator: Arc<MockOrchestrator>) -> EngineRuntime {
    EngineRuntime::builder()
        .pool(pool.clone())
        .orchestrator(orchestrator)
        .remote(Arc::new(MockRemoteCompute::new()))
        .workers(2)
        .queue_depth(8)
        .scheduler_enabled(false)
        .build()
        .unwrap()
        .start()
        .await
        .unwrap()
}

/// Poll until the execution leaves `status` or the deadline passes.
async fn wait_for_change(pool: &PgPool, id: Uuid, status: ExecutionStatus) -> Execution {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let execution = reload(pool, id).await;
        if execution.status != status || tokio::time::Instant::now() > deadline {
            return execution;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

fn launch_request(execution_id: Uuid) -> LaunchRequest {
    LaunchRequest {
        execution_id,
        image_ref: "registry.local/scripts/ndvi:7".to_string(),
        resources: ResourceSpec {
            cpu_limit: Some(2.0),
            memory_limit_bytes: Some(2 * 1024 * 1024 * 1024),
            ..Default::default()
        },
    }
}

#[tokio::test]
async fn test_launch_starts_container_and_marks_ready() {
    skip_if_no_db!();
    let pool = get_test_pool().await.expect("Failed to get pool");
    let orchestrator = Arc::new(MockOrchestrator::new());
    let runtime = start_runtime(&pool, orchestrator.clone()).await;

    let execution = create_pending(&pool, Uuid::new_v4()).await;
    runtime.launch(launch_request(execution.id)).await.unwrap();

    let updated = wait_for_change(&pool, execution.id, ExecutionStatus::Pending).await;
    assert_eq!(updated.status, ExecutionStatus::Ready);
    assert!(orchestrator.is_present(execution.id).await);
    assert_eq!(
        orchestrator
            .resources_of(execution.id)
            .await
            .and_then(|r| r.cpu_limit),
        Some(2.0)
    );

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_failed_launch_fails_execution() {
    skip_if_no_db!();
    let pool = get_test_pool().await.expect("Failed to get pool");
    let orchestrator = Arc::new(MockOrchestrator::failing_start());
    let runtime = start_runtime(&pool, orchestrator.clone()).await;

    let execution = create_pending(&pool, Uuid::new_v4()).await;
    runtime.launch(launch_request(execution.id)).await.unwrap();

    let updated = wait_for_change(&pool, execution.id, ExecutionStatus::Pending).await;
    assert_eq!(updated.status, ExecutionStatus::Failed);
    assert!(updated.end_date.is_some());

    let logs = db::list_logs(&pool, execution.id).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].level, "ERROR");
    assert!(logs[0].text.contains("Failed to start container"));

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_launch_of_ended_execution_removes_container() {
    skip_if_no_db!();
    let pool = get_test_pool().await.expect("Failed to get pool");
    let orchestrator = Arc::new(MockOrchestrator::new());
    let runtime = start_runtime(&pool, orchestrator.clone()).await;

    // Cancelled before the worker got to create its container
    let id = insert_terminal(&pool, Uuid::new_v4(), ExecutionStatus::Cancelled, Utc::now()).await;
    runtime.launch(launch_request(id)).await.unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while orchestrator.calls_for(id).await.len() < 2 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    assert_eq!(
        orchestrator.calls_for(id).await,
        vec![
            OrchestratorCall::Start(id, "registry.local/scripts/ndvi:7".to_string()),
            OrchestratorCall::StopAndRemove(id),
        ]
    );
    assert!(!orchestrator.is_present(id).await);

    let execution = reload(&pool, id).await;
    assert_eq!(execution.status, ExecutionStatus::Cancelled);
    assert_eq!(status_log_count(&pool, id).await, 0);

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_cancel_through_pool() {
    skip_if_no_db!();
    let pool = get_test_pool().await.expect("Failed to get pool");
    let orchestrator = Arc::new(MockOrchestrator::new());
    let runtime = start_runtime(&pool, orchestrator.clone()).await;

    let owner = Uuid::new_v4();
    let execution = create_pending(&pool, owner).await;

    let outcome = runtime
        .cancel(execution.id, Requester::user(owner))
        .await
        .unwrap();
    assert_eq!(outcome.execution.status, ExecutionStatus::Cancelled);

    let err = runtime
        .cancel(execution.id, Requester::user(owner))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidState { .. }));

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_submit_after_shutdown_fails() {
    skip_if_no_db!();
    let pool = get_test_pool().await.expect("Failed to get pool");
    let runtime = start_runtime(&pool, Arc::new(MockOrchestrator::new())).await;

    let jobs = runtime.jobs();
    runtime.shutdown().await;

    let err = jobs
        .cancel(Uuid::new_v4(), Requester::admin(Uuid::new_v4()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::PoolClosed));
}
