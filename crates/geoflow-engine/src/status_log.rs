// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Read-only, paginated access to the status audit trail.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

use crate::error::{Error, Result};
use crate::models::StatusLog;

/// Hard upper bound on `per_page`.
pub const MAX_PER_PAGE: u32 = 1000;

/// Page size used when none is requested.
pub const DEFAULT_PER_PAGE: u32 = 50;

/// Sort order for status-log listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusLogSort {
    /// Newest first (`-timestamp`).
    #[default]
    TimestampDesc,
    /// Oldest first (`timestamp`).
    TimestampAsc,
    /// Highest ID first (`-id`).
    IdDesc,
    /// Lowest ID first (`id`).
    IdAsc,
}

impl StatusLogSort {
    /// Parse a sort key such as `-timestamp`.
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim() {
            "" | "-timestamp" => Ok(Self::TimestampDesc),
            "timestamp" | "+timestamp" => Ok(Self::TimestampAsc),
            "-id" => Ok(Self::IdDesc),
            "id" | "+id" => Ok(Self::IdAsc),
            other => Err(Error::InvalidRequest(format!("unsupported sort key '{}'", other))),
        }
    }

    fn order_by(&self) -> &'static str {
        match self {
            Self::TimestampDesc => "timestamp DESC, id DESC",
            Self::TimestampAsc => "timestamp ASC, id ASC",
            Self::IdDesc => "id DESC",
            Self::IdAsc => "id ASC",
        }
    }
}

/// Filters and pagination for [`list`].
#[derive(Debug, Clone)]
pub struct StatusLogQuery {
    /// Only rows at or after this instant.
    pub start_date: Option<DateTime<Utc>>,
    /// Only rows at or before this instant.
    pub end_date: Option<DateTime<Utc>>,
    /// Sort order.
    pub sort: StatusLogSort,
    /// 1-based page number.
    pub page: u32,
    /// Rows per page, clamped to `1..=MAX_PER_PAGE`.
    pub per_page: u32,
}

impl Default for StatusLogQuery {
    fn default() -> Self {
        Self {
            start_date: None,
            end_date: None,
            sort: StatusLogSort::default(),
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl StatusLogQuery {
    /// Page number actually used (at least 1).
    pub fn effective_page(&self) -> u32 {
        self.page.max(1)
    }

    /// Page size actually used.
    pub fn effective_per_page(&self) -> u32 {
        self.per_page.clamp(1, MAX_PER_PAGE)
    }

    fn offset(&self) -> i64 {
        i64::from(self.effective_page() - 1) * i64::from(self.effective_per_page())
    }
}

/// One page of status-log rows.
#[derive(Debug, Clone, Serialize)]
pub struct StatusLogPage {
    /// Rows on this page.
    pub items: Vec<StatusLog>,
    /// Page number.
    pub page: u32,
    /// Page size used.
    pub per_page: u32,
    /// Rows matching the filters across all pages.
    pub total: i64,
}

/// List status-log rows.
pub async fn list(pool: &PgPool, query: &StatusLogQuery) -> Result<StatusLogPage> {
    let per_page = query.effective_per_page();

    let (total,): (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*)
        FROM status_logs
        WHERE ($1::timestamptz IS NULL OR timestamp >= $1)
          AND ($2::timestamptz IS NULL OR timestamp <= $2)
        "#,
    )
    .bind(query.start_date)
    .bind(query.end_date)
    .fetch_one(pool)
    .await?;

    let items = sqlx::query_as::<_, StatusLog>(&format!(
        r#"
        SELECT id, timestamp, execution_id, status_from, status_to,
               executions_active, executions_ready, executions_running,
               executions_finished, executions_failed, executions_cancelled
        FROM status_logs
        WHERE ($1::timestamptz IS NULL OR timestamp >= $1)
          AND ($2::timestamptz IS NULL OR timestamp <= $2)
        ORDER BY {}
        LIMIT $3 OFFSET $4
        "#,
        query.sort.order_by()
    ))
    .bind(query.start_date)
    .bind(query.end_date)
    .bind(i64::from(per_page))
    .bind(query.offset())
    .fetch_all(pool)
    .await?;

    Ok(StatusLogPage {
        items,
        page: query.effective_page(),
        per_page,
        total,
    })
}
