// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Docker orchestrator implementation.
//!
//! Drives the Docker CLI. Executions run as swarm services named
//! `execution-{id}`; plain containers with the same name (left over from
//! standalone runs) are removed as well. On a node without swarm mode there
//! are no services, so removal and inspection fall through to containers.

use std::process::Output;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::container_name;
use crate::orchestrator::{Orchestrator, OrchestratorError, RemovalOutcome, ResourceSpec, Result};

/// Docker orchestrator configuration
#[derive(Debug, Clone)]
pub struct DockerOrchestratorConfig {
    /// Docker CLI binary
    pub docker_bin: String,
    /// Timeout applied to every CLI call
    pub command_timeout: Duration,
    /// Network attached to execution services
    pub network: Option<String>,
}

impl Default for DockerOrchestratorConfig {
    fn default() -> Self {
        Self {
            docker_bin: "docker".to_string(),
            command_timeout: Duration::from_secs(60),
            network: None,
        }
    }
}

impl DockerOrchestratorConfig {
    /// Load configuration from environment variables.
    ///
    /// - `GEOFLOW_DOCKER_BIN`: CLI binary (default: docker)
    /// - `GEOFLOW_DOCKER_TIMEOUT_SECS`: per-call timeout (default: 60)
    /// - `GEOFLOW_DOCKER_NETWORK`: network for execution services (default: none)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            docker_bin: std::env::var("GEOFLOW_DOCKER_BIN").unwrap_or(defaults.docker_bin),
            command_timeout: std::env::var("GEOFLOW_DOCKER_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.command_timeout),
            network: std::env::var("GEOFLOW_DOCKER_NETWORK")
                .ok()
                .filter(|v| !v.is_empty()),
        }
    }
}

/// How a failed CLI call should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failure {
    /// The named object does not exist.
    NotFound,
    /// The daemon could not be reached.
    Unreachable,
    /// Swarm mode is not active on this node, so no services exist.
    NoSwarm,
    /// Anything else.
    Other,
}

fn classify_stderr(stderr: &str) -> Failure {
    let lower = stderr.to_ascii_lowercase();
    if lower.contains("cannot connect to the docker daemon")
        || lower.contains("error during connect")
        || lower.contains("is the docker daemon running")
        || lower.contains("permission denied while trying to connect")
    {
        Failure::Unreachable
    } else if lower.contains("not a swarm manager") || lower.contains("swarm is not active") {
        Failure::NoSwarm
    } else if lower.contains("no such service")
        || lower.contains("no such container")
        || lower.contains("no such object")
        || lower.contains("not found")
    {
        Failure::NotFound
    } else {
        Failure::Other
    }
}

/// Build the `docker service create` arguments for an execution.
fn service_create_args(
    name: &str,
    execution_id: Uuid,
    image_ref: &str,
    resources: &ResourceSpec,
    network: Option<&str>,
) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "service".into(),
        "create".into(),
        "--detach".into(),
        "--name".into(),
        name.into(),
        "--restart-condition".into(),
        "none".into(),
        "--label".into(),
        format!("geoflow.execution_id={}", execution_id),
        "--env".into(),
        format!("EXECUTION_ID={}", execution_id),
    ];

    if let Some(cpu) = resources.cpu_reservation {
        args.extend(["--reserve-cpu".into(), cpu.to_string()]);
    }
    if let Some(cpu) = resources.cpu_limit {
        args.extend(["--limit-cpu".into(), cpu.to_string()]);
    }
    if let Some(mem) = resources.memory_reservation_bytes {
        args.extend(["--reserve-memory".into(), mem.to_string()]);
    }
    if let Some(mem) = resources.memory_limit_bytes {
        args.extend(["--limit-memory".into(), mem.to_string()]);
    }
    if let Some(network) = network {
        args.extend(["--network".into(), network.to_string()]);
    }

    // Sorted so the command line is stable across runs
    let mut env: Vec<_> = resources.env.iter().collect();
    env.sort();
    for (key, value) in env {
        args.extend(["--env".into(), format!("{}={}", key, value)]);
    }

    args.push(image_ref.to_string());
    args
}

/// Docker CLI orchestrator.
pub struct DockerOrchestrator {
    config: DockerOrchestratorConfig,
}

impl DockerOrchestrator {
    /// Create a new Docker orchestrator.
    pub fn new(config: DockerOrchestratorConfig) -> Self {
        Self { config }
    }

    /// Create a Docker orchestrator configured from environment variables.
    pub fn from_env() -> Self {
        Self::new(DockerOrchestratorConfig::from_env())
    }

    /// Run a docker CLI command, enforcing the configured timeout.
    async fn docker(&self, args: &[&str]) -> Result<Output> {
        let mut command = Command::new(&self.config.docker_bin);
        command.args(args).kill_on_drop(true);

        debug!(args = ?args, "Running docker command");

        match tokio::time::timeout(self.config.command_timeout, command.output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => Err(
                OrchestratorError::Unavailable(format!("{} not found", self.config.docker_bin)),
            ),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(OrchestratorError::Timeout(
                self.config.command_timeout.as_secs(),
            )),
        }
    }

    /// Run a removal/inspection command and fold "does not exist" into `Ok(false)`.
    ///
    /// Service commands on a node without swarm mode count as "does not exist".
    ///
    /// Returns `Ok(true)` if the command succeeded.
    async fn run_tolerating_absence(&self, args: &[&str]) -> Result<bool> {
        let output = self.docker(args).await?;
        if output.status.success() {
            return Ok(true);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        match classify_stderr(&stderr) {
            Failure::NotFound | Failure::NoSwarm => Ok(false),
            Failure::Unreachable => Err(OrchestratorError::Unavailable(stderr)),
            Failure::Other => Err(OrchestratorError::CommandFailed {
                command: format!("docker {}", args.join(" ")),
                exit_code: output.status.code(),
                stderr,
            }),
        }
    }
}

#[async_trait]
impl Orchestrator for DockerOrchestrator {
    fn orchestrator_type(&self) -> &'static str {
        "docker"
    }

    async fn start(
        &self,
        execution_id: Uuid,
        image_ref: &str,
        resources: &ResourceSpec,
    ) -> Result<()> {
        let name = container_name(execution_id);
        let args = service_create_args(
            &name,
            execution_id,
            image_ref,
            resources,
            self.config.network.as_deref(),
        );
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        let output = self.docker(&args).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if classify_stderr(&stderr) == Failure::Unreachable {
                return Err(OrchestratorError::Unavailable(stderr));
            }
            return Err(OrchestratorError::CommandFailed {
                command: "docker service create".to_string(),
                exit_code: output.status.code(),
                stderr,
            });
        }

        info!(
            execution_id = %execution_id,
            service = %name,
            image = %image_ref,
            "Started execution service"
        );
        Ok(())
    }

    async fn stop_and_remove(&self, execution_id: Uuid) -> Result<RemovalOutcome> {
        let name = container_name(execution_id);

        // Container removal runs even if the service could not be removed
        let service = self.run_tolerating_absence(&["service", "rm", &name]).await;
        let container = self.run_tolerating_absence(&["rm", "--force", &name]).await;
        let service_removed = service?;
        let container_removed = container?;

        let outcome = if service_removed || container_removed {
            RemovalOutcome::Removed
        } else {
            RemovalOutcome::AlreadyAbsent
        };

        match outcome {
            RemovalOutcome::Removed => info!(
                execution_id = %execution_id,
                service_removed,
                container_removed,
                "Removed execution service/container"
            ),
            RemovalOutcome::AlreadyAbsent => debug!(
                execution_id = %execution_id,
                "Execution service/container already absent"
            ),
        }

        Ok(outcome)
    }

    async fn exists(&self, execution_id: Uuid) -> Result<bool> {
        let name = container_name(execution_id);

        if self
            .run_tolerating_absence(&["service", "inspect", "--format", "{{.ID}}", &name])
            .await?
        {
            return Ok(true);
        }

        let found = self
            .run_tolerating_absence(&["container", "inspect", "--format", "{{.Id}}", &name])
            .await?;
        if !found {
            debug!(execution_id = %execution_id, "No service or container for execution");
        }
        Ok(found)
    }
}
