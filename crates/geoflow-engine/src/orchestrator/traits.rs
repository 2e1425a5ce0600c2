// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Orchestrator trait definitions.
//!
//! Defines the abstract interface for container platform clients.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors from orchestrator operations.
///
/// "Resource already absent" is not an error; removal reports it as
/// [`RemovalOutcome::AlreadyAbsent`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OrchestratorError {
    /// The container platform could not be reached (daemon down, no socket).
    #[error("Orchestrator unavailable: {0}")]
    Unavailable(String),

    /// The platform rejected the command.
    #[error("Command `{command}` failed with exit code {exit_code:?}: {stderr}")]
    CommandFailed {
        /// Command that was run.
        command: String,
        /// Exit code, if the process exited normally.
        exit_code: Option<i32>,
        /// Standard error output.
        stderr: String,
    },

    /// The platform did not answer within the configured timeout.
    #[error("Orchestrator call timed out after {0}s")]
    Timeout(u64),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error.
    #[error("Other: {0}")]
    Other(String),
}

impl OrchestratorError {
    /// Whether the same call may succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OrchestratorError::Unavailable(_) | OrchestratorError::Timeout(_) | OrchestratorError::Io(_)
        )
    }
}

/// Result type for orchestrator operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Outcome of a successful removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalOutcome {
    /// A service or container existed and was removed.
    Removed,
    /// Nothing was running under the execution's name.
    AlreadyAbsent,
}

/// Resource reservation and limits for an execution's container.
///
/// Comes from the script's metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// Reserved CPUs (e.g. 0.5).
    pub cpu_reservation: Option<f64>,
    /// CPU limit.
    pub cpu_limit: Option<f64>,
    /// Reserved memory in bytes.
    pub memory_reservation_bytes: Option<u64>,
    /// Memory limit in bytes.
    pub memory_limit_bytes: Option<u64>,
    /// Environment variables passed to the container.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Trait for container platform clients.
///
/// Orchestrators are PURE infrastructure adapters - they never touch the
/// execution store. Callers translate what they report into status
/// transitions.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Orchestrator type identifier (e.g., "docker", "mock").
    fn orchestrator_type(&self) -> &'static str;

    /// Launch the service/container for an execution.
    async fn start(&self, execution_id: Uuid, image_ref: &str, resources: &ResourceSpec)
    -> Result<()>;

    /// Stop and remove everything running under the execution's name.
    ///
    /// Idempotent: if nothing exists the call succeeds with
    /// [`RemovalOutcome::AlreadyAbsent`].
    async fn stop_and_remove(&self, execution_id: Uuid) -> Result<RemovalOutcome>;

    /// Whether a service or container exists for the execution.
    async fn exists(&self, execution_id: Uuid) -> Result<bool>;
}
