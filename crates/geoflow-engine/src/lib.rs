// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Geoflow Engine - Execution Orchestration and Status Tracking
//!
//! This crate runs user-submitted geoprocessing scripts as isolated
//! container services and keeps their lifecycle consistent: every status
//! change is recorded atomically with a snapshot of system-wide counts,
//! cancellations tear down local and remote resources, and periodic sweeps
//! reconcile the database with the container platform.
//!
//! # Architecture
//!
//! ```text
//!        API layer (run / cancel / progress / status-log endpoints)
//!                 │                         │
//!                 │ launch, cancel          │ transition, list
//!                 ▼                         ▼
//! ┌──────────────────────────────┐   ┌──────────────────────┐
//! │ WorkerPool (bounded queue)   │   │ transition           │
//! │  ├─ launch    ─┐             │   │ status_log           │
//! │  ├─ cancel    ─┼─► Orchestrator ─► docker service/container
//! │  └─ sweep     ─┘             │   └──────────┬───────────┘
//! └──────────▲───────────────────┘              │
//!            │ Job::Sweep                       ▼
//!     SweepScheduler                       PostgreSQL
//!                                (executions, execution_logs,
//!                                 status_logs)
//! ```
//!
//! # Execution Lifecycle
//!
//! ```text
//! PENDING ──► READY ──► RUNNING ──┬──► FINISHED
//!    │          │          │      ├──► FAILED
//!    └──────────┴──────────┴──────┴──► CANCELLED
//! ```
//!
//! Statuses only move forward and terminal statuses are final. Every
//! accepted move writes exactly one `status_logs` row in the same
//! transaction as the status change.
//!
//! # Configuration
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `GEOFLOW_DATABASE_URL` | Yes* | - | PostgreSQL connection string |
//! | `DATABASE_URL` | Yes* | - | Fallback if above not set |
//! | `GEOFLOW_WORKERS` | No | `4` | Worker tasks |
//! | `GEOFLOW_QUEUE_DEPTH` | No | `256` | Job queue depth |
//! | `GEOFLOW_DOCKER_BIN` | No | `docker` | Docker CLI binary |
//! | `GEOFLOW_DOCKER_TIMEOUT_SECS` | No | `60` | Per-command timeout |
//! | `GEOFLOW_REMOTE_API_URL` | No | - | Remote compute API (enables remote cancellation) |
//! | `GEOFLOW_SWEEP_STALE_AFTER_HOURS` | No | `72` | Stale execution threshold |
//! | `GEOFLOW_SWEEP_FAILED_RETENTION_DAYS` | No | `14` | Old-failed threshold |

#![deny(missing_docs)]

/// Database migrations for geoflow-engine.
pub mod migrations;

/// Engine configuration loaded from environment variables.
pub mod config;

/// PostgreSQL operations for executions, logs and the status audit trail.
pub mod db;

/// Error types for engine operations.
pub mod error;

/// Domain types: executions, statuses, status logs, requesters.
pub mod models;

/// The single writer of execution status.
pub mod transition;

/// Container platform adapters (Docker, mock).
pub mod orchestrator;

/// Remote compute API client.
pub mod remote;

/// Remote task ID extraction from execution logs.
pub mod task_ids;

/// Cancellation of executions and their remote tasks.
pub mod cancellation;

/// Sweep jobs reconciling executions with the container platform.
pub mod sweeper;

/// Periodic triggering of sweep jobs.
pub mod scheduler;

/// Worker pool running orchestrator-bound jobs.
pub mod worker_pool;

/// Paginated status-log queries.
pub mod status_log;

/// Embeddable runtime.
pub mod runtime;

pub use config::Config;
pub use error::{Error, Result};
