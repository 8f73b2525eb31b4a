//! Client for the local command-execution service.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default endpoint of the local execution service.
pub const DEFAULT_EXECUTOR_URL: &str = "http://localhost:5000/execute";

#[derive(Serialize, Debug)]
struct ExecuteRequest<'a> {
    command: &'a str,
    confirmed: bool,
}

/// What the execution service reported for one command.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    #[serde(default)]
    pub success: bool,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    /// Set by the service when it could not run the command at all.
    pub error: Option<String>,
}

/// Runs an already-confirmed command out of process.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, command: &str) -> Result<ExecutionResult>;
}

/// `CommandExecutor` backed by the HTTP execution service.
pub struct HttpCommandExecutor {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpCommandExecutor {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl CommandExecutor for HttpCommandExecutor {
    async fn execute(&self, command: &str) -> Result<ExecutionResult> {
        debug!(endpoint = %self.endpoint, "Sending execution request");
        let response = self
            .client
            .post(&self.endpoint)
            .json(&ExecuteRequest {
                command,
                confirmed: true,
            })
            .send()
            .await
            .context("Execution service request failed")?;
        response
            .json::<ExecutionResult>()
            .await
            .context("Execution service returned an unreadable response")
    }
}
