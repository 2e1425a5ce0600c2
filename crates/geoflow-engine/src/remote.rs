// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Remote compute API client.
//!
//! Scripts may submit long-running tasks to a third-party compute platform.
//! When an execution is cancelled those tasks are cancelled on a best-effort
//! basis; nothing here is retried.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::RemoteConfig;

/// Errors from the remote compute API.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RemoteError {
    /// Transport-level failure (connect, TLS, timeout).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("Remote API returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body (truncated).
        body: String,
    },

    /// No remote compute API is configured.
    #[error("Remote compute API not configured")]
    NotConfigured,
}

/// Client for the remote compute platform.
#[async_trait]
pub trait RemoteCompute: Send + Sync {
    /// Request cancellation of one remote task.
    async fn cancel_task(&self, task_id: &str) -> Result<(), RemoteError>;
}

const MAX_ERROR_BODY: usize = 512;

/// HTTP client for the remote compute REST API.
pub struct HttpRemoteCompute {
    client: reqwest::Client,
    base_url: String,
    project: String,
    token: String,
}

impl HttpRemoteCompute {
    /// Create a client from connection settings.
    pub fn new(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            project: config.project.clone(),
            token: config.token.clone(),
        })
    }

    /// URL of the cancel endpoint for a task.
    pub fn cancel_url(&self, task_id: &str) -> String {
        format!(
            "{}/v1/projects/{}/operations/{}:cancel",
            self.base_url, self.project, task_id
        )
    }
}

#[async_trait]
impl RemoteCompute for HttpRemoteCompute {
    async fn cancel_task(&self, task_id: &str) -> Result<(), RemoteError> {
        let url = self.cancel_url(task_id);
        debug!(task_id = %task_id, url = %url, "Cancelling remote task");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&serde_json::json!({}))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body,
            });
        }

        info!(task_id = %task_id, "Remote task cancellation requested");
        Ok(())
    }
}

/// Remote client used when no API is configured; every call fails.
#[derive(Debug, Default)]
pub struct DisabledRemoteCompute;

#[async_trait]
impl RemoteCompute for DisabledRemoteCompute {
    async fn cancel_task(&self, _task_id: &str) -> Result<(), RemoteError> {
        Err(RemoteError::NotConfigured)
    }
}

/// In-memory remote client for tests.
#[derive(Debug, Default)]
pub struct MockRemoteCompute {
    cancelled: Mutex<Vec<String>>,
    failing: HashSet<String>,
}

impl MockRemoteCompute {
    /// Create a mock where every cancellation succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock where cancelling any of `task_ids` fails.
    pub fn failing_for<I, S>(task_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cancelled: Mutex::new(Vec::new()),
            failing: task_ids.into_iter().map(Into::into).collect(),
        }
    }

    /// Task IDs for which cancellation was attempted, in order.
    pub fn attempted(&self) -> Vec<String> {
        self.cancelled
            .lock()
            .map(|ids| ids.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl RemoteCompute for MockRemoteCompute {
    async fn cancel_task(&self, task_id: &str) -> Result<(), RemoteError> {
        if let Ok(mut ids) = self.cancelled.lock() {
            ids.push(task_id.to_string());
        }
        if self.failing.contains(task_id) {
            return Err(RemoteError::Status {
                status: 500,
                body: "mock failure".to_string(),
            });
        }
        Ok(())
    }
}
