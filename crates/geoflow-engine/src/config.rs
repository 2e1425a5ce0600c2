// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for geoflow-engine.

use std::time::Duration;

use crate::orchestrator::DockerOrchestratorConfig;
use crate::scheduler::ScheduleConfig;
use crate::sweeper::SweepConfig;

/// Engine configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string
    pub database_url: String,
    /// Maximum database connections in the pool
    pub max_connections: u32,
    /// Number of worker tasks in the pool
    pub workers: usize,
    /// Bounded queue depth in front of the workers
    pub queue_depth: usize,
    /// Docker CLI settings
    pub docker: DockerOrchestratorConfig,
    /// Remote compute API settings (None disables remote cancellation)
    pub remote: Option<RemoteConfig>,
    /// Sweep thresholds
    pub sweep: SweepConfig,
    /// Sweep cadences
    pub schedule: ScheduleConfig,
}

/// Remote compute API connection settings.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// API base URL
    pub base_url: String,
    /// Project the tasks are billed to
    pub project: String,
    /// Bearer token
    pub token: String,
    /// Request timeout
    pub timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("GEOFLOW_DATABASE_URL")
            .or_else(|_| std::env::var("DATABASE_URL"))
            .map_err(|_| ConfigError::MissingEnvVar("GEOFLOW_DATABASE_URL or DATABASE_URL"))?;

        let max_connections = parse_var("GEOFLOW_DB_MAX_CONNECTIONS", 10)?;
        let workers = parse_var("GEOFLOW_WORKERS", 4)?;
        let queue_depth = parse_var("GEOFLOW_QUEUE_DEPTH", 256)?;
        if workers == 0 {
            return Err(ConfigError::InvalidValue("GEOFLOW_WORKERS"));
        }

        let remote = match std::env::var("GEOFLOW_REMOTE_API_URL") {
            Ok(base_url) if !base_url.is_empty() => {
                let project = std::env::var("GEOFLOW_REMOTE_API_PROJECT")
                    .map_err(|_| ConfigError::MissingEnvVar("GEOFLOW_REMOTE_API_PROJECT"))?;
                let token = std::env::var("GEOFLOW_REMOTE_API_TOKEN")
                    .map_err(|_| ConfigError::MissingEnvVar("GEOFLOW_REMOTE_API_TOKEN"))?;
                Some(RemoteConfig {
                    base_url,
                    project,
                    token,
                    timeout: Duration::from_secs(parse_var("GEOFLOW_REMOTE_API_TIMEOUT_SECS", 30)?),
                })
            }
            _ => None,
        };

        Ok(Self {
            database_url,
            max_connections,
            workers,
            queue_depth,
            docker: DockerOrchestratorConfig::from_env(),
            remote,
            sweep: SweepConfig::from_env(),
            schedule: ScheduleConfig::from_env(),
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(v) => v.parse().map_err(|_| ConfigError::InvalidValue(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),
    /// An environment variable could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
