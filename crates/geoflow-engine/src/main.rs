// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Geoflow Engine - standalone worker process
//!
//! Runs the worker pool and the sweep scheduler against the shared
//! PostgreSQL database and the local Docker daemon.

use std::sync::Arc;
use tracing::{info, warn};

use geoflow_engine::config::Config;
use geoflow_engine::migrations;
use geoflow_engine::orchestrator::{DockerOrchestrator, Orchestrator};
use geoflow_engine::remote::{DisabledRemoteCompute, HttpRemoteCompute, RemoteCompute};
use geoflow_engine::runtime::EngineRuntime;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "geoflow_engine=info".into()),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    let config = Config::from_env()?;

    info!(
        workers = config.workers,
        queue_depth = config.queue_depth,
        docker_bin = %config.docker.docker_bin,
        remote_api = config.remote.is_some(),
        "Starting Geoflow Engine"
    );

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;

    info!("Connected to database");

    migrations::run(&pool).await?;

    info!("Database schema verified");

    let orchestrator = Arc::new(DockerOrchestrator::new(config.docker.clone()));
    info!(
        orchestrator_type = orchestrator.orchestrator_type(),
        "Orchestrator initialized"
    );

    let remote: Arc<dyn RemoteCompute> = match &config.remote {
        Some(remote) => Arc::new(HttpRemoteCompute::new(remote)?),
        None => {
            warn!("GEOFLOW_REMOTE_API_URL not set; remote tasks will not be cancelled");
            Arc::new(DisabledRemoteCompute)
        }
    };

    let runtime = EngineRuntime::builder()
        .pool(pool)
        .orchestrator(orchestrator)
        .remote(remote)
        .workers(config.workers)
        .queue_depth(config.queue_depth)
        .sweep_config(config.sweep.clone())
        .schedule_config(config.schedule.clone())
        .build()?
        .start()
        .await?;

    info!("Geoflow Engine ready");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    runtime.shutdown().await;

    info!("Geoflow Engine shut down");

    Ok(())
}
