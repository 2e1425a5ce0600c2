// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tests for status-log listing.

#[macro_use]
mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::*;
use geoflow_engine::models::ExecutionStatus;
use geoflow_engine::status_log::{self, MAX_PER_PAGE, StatusLogQuery, StatusLogSort};
use geoflow_engine::transition::transition;
use uuid::Uuid;

#[tokio::test]
async fn test_list_returns_transitions_newest_first() {
    skip_if_no_db!();
    let pool = get_test_pool().await.expect("Failed to get pool");

    let since = Utc::now() - ChronoDuration::seconds(1);
    let execution = create_pending(&pool, Uuid::new_v4()).await;
    let running = transition(&pool, execution.id, ExecutionStatus::Running)
        .await
        .unwrap();
    let finished = transition(&pool, execution.id, ExecutionStatus::Finished)
        .await
        .unwrap();

    let page = status_log::list(
        &pool,
        &StatusLogQuery {
            start_date: Some(since),
            per_page: MAX_PER_PAGE,
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert!(page.total >= 2);
    let ours: Vec<i64> = page
        .items
        .iter()
        .filter(|log| log.execution_id == Some(execution.id))
        .map(|log| log.id)
        .collect();
    assert_eq!(ours, vec![finished.id, running.id]);

    // Default sort is -timestamp
    assert!(
        page.items
            .windows(2)
            .all(|w| w[0].timestamp >= w[1].timestamp)
    );
}

#[tokio::test]
async fn test_list_pagination_and_sort() {
    skip_if_no_db!();
    let pool = get_test_pool().await.expect("Failed to get pool");

    let since = Utc::now() - ChronoDuration::seconds(1);
    for _ in 0..3 {
        let execution = create_pending(&pool, Uuid::new_v4()).await;
        transition(&pool, execution.id, ExecutionStatus::Cancelled)
            .await
            .unwrap();
    }

    let first = status_log::list(
        &pool,
        &StatusLogQuery {
            start_date: Some(since),
            sort: StatusLogSort::IdAsc,
            page: 1,
            per_page: 2,
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let second = status_log::list(
        &pool,
        &StatusLogQuery {
            start_date: Some(since),
            sort: StatusLogSort::IdAsc,
            page: 2,
            per_page: 2,
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(first.items.len(), 2);
    assert_eq!(first.per_page, 2);
    assert!(first.total >= 3);
    assert!(first.items[0].id < first.items[1].id);
    assert!(!second.items.is_empty());
    assert!(first.items[1].id < second.items[0].id);
}

#[tokio::test]
async fn test_list_caps_page_size_and_filters_by_date() {
    skip_if_no_db!();
    let pool = get_test_pool().await.expect("Failed to get pool");

    let page = status_log::list(
        &pool,
        &StatusLogQuery {
            per_page: 1_000_000,
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(page.per_page, MAX_PER_PAGE);
    assert!(page.items.len() <= MAX_PER_PAGE as usize);

    let future = Utc::now() + ChronoDuration::days(365);
    let empty = status_log::list(
        &pool,
        &StatusLogQuery {
            start_date: Some(future),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(empty.total, 0);
    assert!(empty.items.is_empty());
}
