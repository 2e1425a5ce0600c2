// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Domain types for executions and their audit trail.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::Error;

/// Lifecycle status of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    /// Created, waiting for its container.
    Pending,
    /// Container image resolved, about to run.
    Ready,
    /// Container is running.
    Running,
    /// Completed successfully.
    Finished,
    /// Completed with an error or was reaped.
    Failed,
    /// Stopped on request.
    Cancelled,
}

impl ExecutionStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [ExecutionStatus; 6] = [
        ExecutionStatus::Pending,
        ExecutionStatus::Ready,
        ExecutionStatus::Running,
        ExecutionStatus::Finished,
        ExecutionStatus::Failed,
        ExecutionStatus::Cancelled,
    ];

    /// Database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "PENDING",
            ExecutionStatus::Ready => "READY",
            ExecutionStatus::Running => "RUNNING",
            ExecutionStatus::Finished => "FINISHED",
            ExecutionStatus::Failed => "FAILED",
            ExecutionStatus::Cancelled => "CANCELLED",
        }
    }

    /// Terminal statuses accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Finished | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }

    fn rank(&self) -> u8 {
        match self {
            ExecutionStatus::Pending => 0,
            ExecutionStatus::Ready => 1,
            ExecutionStatus::Running => 2,
            _ => 3,
        }
    }

    /// Whether moving from `self` to `next` is a valid transition.
    ///
    /// Statuses only move forward: `PENDING → READY → RUNNING → terminal`,
    /// skipping steps is allowed, and terminal statuses are final.
    pub fn can_transition_to(&self, next: ExecutionStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ExecutionStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::CorruptRecord(format!("unknown execution status '{}'", s)))
    }
}

/// Name of the container/service backing an execution.
///
/// Other tooling relies on this convention; never derive the name elsewhere.
pub fn container_name(execution_id: Uuid) -> String {
    format!("execution-{}", execution_id)
}

/// Execution row as stored in PostgreSQL.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ExecutionRow {
    /// Execution ID.
    pub id: Uuid,
    /// Script being executed.
    pub script_id: Uuid,
    /// Owning user.
    pub user_id: Uuid,
    /// Status as stored.
    pub status: String,
    /// Progress percentage.
    pub progress: i32,
    /// When the execution started.
    pub start_date: Option<DateTime<Utc>>,
    /// When the execution reached a terminal status.
    pub end_date: Option<DateTime<Utc>>,
    /// Run parameters.
    pub params: Value,
    /// Run results.
    pub results: Value,
}

/// One run of a script.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Execution {
    /// Execution ID.
    pub id: Uuid,
    /// Script being executed.
    pub script_id: Uuid,
    /// Owning user.
    pub user_id: Uuid,
    /// Current status.
    pub status: ExecutionStatus,
    /// Progress percentage (0-100, forced to 100 when terminal).
    pub progress: i32,
    /// When the execution started.
    pub start_date: Option<DateTime<Utc>>,
    /// When the execution reached a terminal status.
    pub end_date: Option<DateTime<Utc>>,
    /// Run parameters.
    pub params: Value,
    /// Run results.
    pub results: Value,
}

impl Execution {
    /// Name of this execution's container/service.
    pub fn container_name(&self) -> String {
        container_name(self.id)
    }
}

impl TryFrom<ExecutionRow> for Execution {
    type Error = Error;

    fn try_from(row: ExecutionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            script_id: row.script_id,
            user_id: row.user_id,
            status: row.status.parse()?,
            progress: row.progress,
            start_date: row.start_date,
            end_date: row.end_date,
            params: row.params,
            results: row.results,
        })
    }
}

/// Input for creating an execution.
#[derive(Debug, Clone)]
pub struct NewExecution {
    /// Script to run.
    pub script_id: Uuid,
    /// Owning user.
    pub user_id: Uuid,
    /// Run parameters.
    pub params: Value,
}

/// Number of executions per status bucket at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct StatusCounts {
    /// RUNNING + PENDING.
    pub active: i64,
    /// READY.
    pub ready: i64,
    /// RUNNING.
    pub running: i64,
    /// FINISHED.
    pub finished: i64,
    /// FAILED.
    pub failed: i64,
    /// CANCELLED.
    pub cancelled: i64,
}

/// Immutable audit row for one status transition.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct StatusLog {
    /// Monotonic row ID.
    pub id: i64,
    /// When the transition was recorded.
    pub timestamp: DateTime<Utc>,
    /// Execution whose status changed (None only for legacy system snapshots).
    pub execution_id: Option<Uuid>,
    /// Status before the transition.
    pub status_from: Option<String>,
    /// Status after the transition.
    pub status_to: Option<String>,
    /// RUNNING + PENDING after the transition.
    pub executions_active: i64,
    /// READY after the transition.
    pub executions_ready: i64,
    /// RUNNING after the transition.
    pub executions_running: i64,
    /// FINISHED after the transition.
    pub executions_finished: i64,
    /// FAILED after the transition.
    pub executions_failed: i64,
    /// CANCELLED after the transition.
    pub executions_cancelled: i64,
}

impl StatusLog {
    /// Snapshot counts carried by this row.
    pub fn counts(&self) -> StatusCounts {
        StatusCounts {
            active: self.executions_active,
            ready: self.executions_ready,
            running: self.executions_running,
            finished: self.executions_finished,
            failed: self.executions_failed,
            cancelled: self.executions_cancelled,
        }
    }
}

/// One log line emitted by a running execution.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct ExecutionLog {
    /// Row ID.
    pub id: i64,
    /// Execution that emitted the line.
    pub execution_id: Uuid,
    /// Severity (DEBUG, INFO, WARNING, ERROR).
    pub level: String,
    /// Log text.
    pub text: String,
    /// When the line was stored.
    pub register_date: DateTime<Utc>,
}

/// Caller role supplied by the auth layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Regular user.
    User,
    /// Administrator, may act on any execution.
    Admin,
}

/// Authenticated caller identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requester {
    /// Caller's user ID.
    pub user_id: Uuid,
    /// Caller's role.
    pub role: Role,
}

impl Requester {
    /// Regular user requester.
    pub fn user(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: Role::User,
        }
    }

    /// Administrator requester.
    pub fn admin(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: Role::Admin,
        }
    }

    /// Whether the requester owns the execution or is an administrator.
    pub fn can_manage(&self, execution: &Execution) -> bool {
        self.role == Role::Admin || execution.user_id == self.user_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ExecutionStatus::*;

    #[test]
    fn test_status_roundtrip_through_db_text() {
        for status in ExecutionStatus::ALL {
            assert_eq!(status.as_str().parse::<ExecutionStatus>().unwrap(), status);
        }
        assert_eq!("running".parse::<ExecutionStatus>().unwrap(), Running);
        assert!("SUSPENDED".parse::<ExecutionStatus>().is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(Finished.is_terminal());
        assert!(Failed.is_terminal());
        assert!(Cancelled.is_terminal());
        assert!(!Pending.is_terminal());
        assert!(!Ready.is_terminal());
        assert!(!Running.is_terminal());
    }

    #[test]
    fn test_transitions_move_forward_only() {
        assert!(Pending.can_transition_to(Running));
        assert!(Pending.can_transition_to(Ready));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Ready.can_transition_to(Running));
        assert!(Running.can_transition_to(Finished));
        assert!(Running.can_transition_to(Cancelled));

        assert!(!Running.can_transition_to(Running));
        assert!(!Running.can_transition_to(Pending));
        assert!(!Ready.can_transition_to(Pending));
    }

    #[test]
    fn test_terminal_statuses_are_final() {
        for from in [Finished, Failed, Cancelled] {
            for to in ExecutionStatus::ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be rejected");
            }
        }
    }

    #[test]
    fn test_container_name_convention() {
        let id = Uuid::parse_str("3f2b1c9e-7a52-4c1d-9f0e-0a1b2c3d4e5f").unwrap();
        assert_eq!(
            container_name(id),
            "execution-3f2b1c9e-7a52-4c1d-9f0e-0a1b2c3d4e5f"
        );
    }

    #[test]
    fn test_requester_can_manage() {
        let owner = Uuid::new_v4();
        let execution = Execution {
            id: Uuid::new_v4(),
            script_id: Uuid::new_v4(),
            user_id: owner,
            status: Running,
            progress: 10,
            start_date: Some(Utc::now()),
            end_date: None,
            params: Value::Null,
            results: Value::Null,
        };

        assert!(Requester::user(owner).can_manage(&execution));
        assert!(Requester::admin(Uuid::new_v4()).can_manage(&execution));
        assert!(!Requester::user(Uuid::new_v4()).can_manage(&execution));
    }
}
