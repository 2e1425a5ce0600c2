// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Orchestrator module - container platform clients.
//!
//! Every execution is backed by at most one service/container named
//! `execution-{id}`, so lookups never need a side index.

pub mod docker;
pub mod mock;
mod traits;

pub use docker::{DockerOrchestrator, DockerOrchestratorConfig};
pub use mock::{MockOrchestrator, OrchestratorCall};
pub use traits::*;
