// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for geoflow-engine.

use thiserror::Error;
use uuid::Uuid;

use crate::models::ExecutionStatus;

/// Engine errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Database operation failed. The enclosing transaction was rolled back.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Request validation failed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Execution was not found.
    #[error("Execution not found: {0}")]
    NotFound(Uuid),

    /// Requester may not act on this execution.
    #[error("Requester {user_id} may not act on execution {execution_id}")]
    Forbidden {
        /// Execution the requester tried to act on.
        execution_id: Uuid,
        /// The requesting user.
        user_id: Uuid,
    },

    /// Requested status change is not valid from the current status.
    #[error("Execution {execution_id} cannot move from {from} to {to}")]
    InvalidState {
        /// Execution whose transition was rejected.
        execution_id: Uuid,
        /// Status at the time of the request.
        from: ExecutionStatus,
        /// Requested status.
        to: ExecutionStatus,
    },

    /// A stored row could not be decoded into a domain value.
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    /// The worker pool is not accepting jobs.
    #[error("Worker pool closed")]
    PoolClosed,

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the error was caused by the caller's request rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidRequest(_)
                | Error::NotFound(_)
                | Error::Forbidden { .. }
                | Error::InvalidState { .. }
        )
    }

    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Database(e) => !matches!(e, sqlx::Error::RowNotFound),
            Error::PoolClosed => true,
            _ => false,
        }
    }
}

/// Result type using engine Error.
pub type Result<T> = std::result::Result<T, Error>;
