// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock orchestrator for testing.
//!
//! Keeps services in memory and records every call so tests can assert on
//! what the engine asked the platform to do.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::traits::*;

/// A call received by the mock.
#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorCall {
    /// `start(execution_id, image_ref, ..)`
    Start(Uuid, String),
    /// `stop_and_remove(execution_id)`
    StopAndRemove(Uuid),
    /// `exists(execution_id)`
    Exists(Uuid),
}

/// Mock service state.
#[derive(Debug, Clone)]
struct MockService {
    #[allow(dead_code)]
    image_ref: String,
    resources: ResourceSpec,
}

/// Mock orchestrator for testing.
pub struct MockOrchestrator {
    services: Arc<Mutex<HashMap<Uuid, MockService>>>,
    calls: Arc<Mutex<Vec<OrchestratorCall>>>,
    /// If true, every call fails as if the daemon were down.
    pub unreachable: bool,
    /// If true, `start` fails with a command error.
    pub fail_start: bool,
}

impl Default for MockOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl MockOrchestrator {
    /// Create a new mock orchestrator.
    pub fn new() -> Self {
        Self {
            services: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            unreachable: false,
            fail_start: false,
        }
    }

    /// Create a mock orchestrator whose platform is unreachable.
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::new()
        }
    }

    /// Create a mock orchestrator that refuses to start services.
    pub fn failing_start() -> Self {
        Self {
            fail_start: true,
            ..Self::new()
        }
    }

    /// Register a running service without going through `start`.
    pub async fn insert_service(&self, execution_id: Uuid, image_ref: &str) {
        self.services.lock().await.insert(
            execution_id,
            MockService {
                image_ref: image_ref.to_string(),
                resources: ResourceSpec::default(),
            },
        );
    }

    /// Whether a service is currently present for the execution.
    pub async fn is_present(&self, execution_id: Uuid) -> bool {
        self.services.lock().await.contains_key(&execution_id)
    }

    /// Resources the service was started with, if present.
    pub async fn resources_of(&self, execution_id: Uuid) -> Option<ResourceSpec> {
        self.services
            .lock()
            .await
            .get(&execution_id)
            .map(|s| s.resources.clone())
    }

    /// All calls received so far, in order.
    pub async fn calls(&self) -> Vec<OrchestratorCall> {
        self.calls.lock().await.clone()
    }

    /// Calls received for one execution.
    pub async fn calls_for(&self, execution_id: Uuid) -> Vec<OrchestratorCall> {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|c| match c {
                OrchestratorCall::Start(id, _)
                | OrchestratorCall::StopAndRemove(id)
                | OrchestratorCall::Exists(id) => *id == execution_id,
            })
            .cloned()
            .collect()
    }

    async fn record(&self, call: OrchestratorCall) -> Result<()> {
        self.calls.lock().await.push(call);
        if self.unreachable {
            return Err(OrchestratorError::Unavailable(
                "Cannot connect to the Docker daemon".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Orchestrator for MockOrchestrator {
    fn orchestrator_type(&self) -> &'static str {
        "mock"
    }

    async fn start(
        &self,
        execution_id: Uuid,
        image_ref: &str,
        resources: &ResourceSpec,
    ) -> Result<()> {
        self.record(OrchestratorCall::Start(execution_id, image_ref.to_string()))
            .await?;

        if self.fail_start {
            return Err(OrchestratorError::CommandFailed {
                command: "service create".to_string(),
                exit_code: Some(1),
                stderr: "Mock start failure".to_string(),
            });
        }

        self.services.lock().await.insert(
            execution_id,
            MockService {
                image_ref: image_ref.to_string(),
                resources: resources.clone(),
            },
        );
        Ok(())
    }

    async fn stop_and_remove(&self, execution_id: Uuid) -> Result<RemovalOutcome> {
        self.record(OrchestratorCall::StopAndRemove(execution_id))
            .await?;

        match self.services.lock().await.remove(&execution_id) {
            Some(_) => Ok(RemovalOutcome::Removed),
            None => Ok(RemovalOutcome::AlreadyAbsent),
        }
    }

    async fn exists(&self, execution_id: Uuid) -> Result<bool> {
        self.record(OrchestratorCall::Exists(execution_id)).await?;
        Ok(self.is_present(execution_id).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_start_and_exists() {
        let orchestrator = MockOrchestrator::new();
        let id = Uuid::new_v4();

        assert!(!orchestrator.exists(id).await.unwrap());

        orchestrator
            .start(id, "scripts/ndvi:1", &ResourceSpec::default())
            .await
            .unwrap();

        assert!(orchestrator.exists(id).await.unwrap());
        assert_eq!(
            orchestrator.calls_for(id).await[1],
            OrchestratorCall::Start(id, "scripts/ndvi:1".to_string())
        );
    }

    #[tokio::test]
    async fn test_mock_stop_and_remove_twice() {
        let orchestrator = MockOrchestrator::new();
        let id = Uuid::new_v4();
        orchestrator.insert_service(id, "scripts/ndvi:1").await;

        let first = orchestrator.stop_and_remove(id).await.unwrap();
        let second = orchestrator.stop_and_remove(id).await.unwrap();

        assert_eq!(first, RemovalOutcome::Removed);
        assert_eq!(second, RemovalOutcome::AlreadyAbsent);
        assert!(!orchestrator.is_present(id).await);
    }

    #[tokio::test]
    async fn test_mock_unreachable() {
        let orchestrator = MockOrchestrator::unreachable();
        let id = Uuid::new_v4();

        let err = orchestrator.stop_and_remove(id).await.unwrap_err();

        assert!(matches!(err, OrchestratorError::Unavailable(_)));
        assert_eq!(orchestrator.calls().await.len(), 1);
    }

    #[tokio::test]
    async fn test_mock_fail_start() {
        let orchestrator = MockOrchestrator::failing_start();
        let id = Uuid::new_v4();

        let result = orchestrator
            .start(id, "scripts/ndvi:1", &ResourceSpec::default())
            .await;

        assert!(matches!(result, Err(OrchestratorError::CommandFailed { .. })));
        assert!(!orchestrator.is_present(id).await);
    }
}
