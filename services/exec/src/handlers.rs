//! Axum handlers for the execution endpoint.

use crate::state::AppState;
use anyhow::{Context, anyhow};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tracing::{error, info, warn};

pub enum ApiError {
    /// The command could not be run to completion (spawn failure or timeout).
    Execution(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Execution(err) => {
                error!("Command execution failed: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse {
                        success: false,
                        error: format!("{:#}", err),
                    }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::Execution(err.into())
    }
}

#[derive(Deserialize, Debug)]
pub struct ExecutePayload {
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub confirmed: bool,
}

/// Reply to an unconfirmed request: the command is echoed back, not run.
#[derive(Serialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationRequired {
    pub needs_confirmation: bool,
    pub command: String,
}

#[derive(Serialize, Debug, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal.
    pub returncode: Option<i32>,
}

#[derive(Serialize, Debug)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

/// `POST /execute`
pub async fn execute(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ExecutePayload>,
) -> Result<Response, ApiError> {
    if !payload.confirmed {
        info!(command = %payload.command, "Command awaiting confirmation.");
        return Ok(Json(ConfirmationRequired {
            needs_confirmation: true,
            command: payload.command,
        })
        .into_response());
    }

    info!(command = %payload.command, "Running confirmed command.");
    let output = run_command(&payload.command, state.config.command_timeout).await?;
    if output.returncode != Some(0) {
        warn!(returncode = ?output.returncode, "Command exited unsuccessfully.");
    }
    Ok(Json(output).into_response())
}

/// Runs `command` through `sh -c`, killing it if it outlives `timeout`.
pub async fn run_command(command: &str, timeout: Duration) -> anyhow::Result<CommandOutput> {
    let mut child = tokio::process::Command::new("sh");
    child.arg("-c").arg(command).kill_on_drop(true);

    let output = tokio::time::timeout(timeout, child.output())
        .await
        .map_err(|_| anyhow!("Command timed out after {} seconds", timeout.as_secs()))?
        .context("Failed to spawn command")?;

    Ok(CommandOutput {
        success: true,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        returncode: output.status.code(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use serde_json::{Value, json};
    use tracing::Level;

    fn state(timeout: Duration) -> State<Arc<AppState>> {
        State(Arc::new(AppState {
            config: Arc::new(Config {
                bind_address: "127.0.0.1:0".parse().unwrap(),
                command_timeout: timeout,
                log_level: Level::INFO,
            }),
        }))
    }

    async fn call(payload: Value, timeout: Duration) -> (StatusCode, Value) {
        let payload: ExecutePayload = serde_json::from_value(payload).unwrap();
        let response = match execute(state(timeout), Json(payload)).await {
            Ok(response) => response,
            Err(err) => err.into_response(),
        };
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_unconfirmed_command_is_echoed_not_run() {
        let (status, body) = call(
            json!({"command": "touch /tmp/voxlink-should-not-exist"}),
            Duration::from_secs(5),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"needsConfirmation": true, "command": "touch /tmp/voxlink-should-not-exist"})
        );
        assert!(!std::path::Path::new("/tmp/voxlink-should-not-exist").exists());
    }

    #[tokio::test]
    async fn test_confirmed_command_reports_output() {
        let (status, body) = call(
            json!({"command": "echo hi; echo oops >&2; exit 3", "confirmed": true}),
            Duration::from_secs(5),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"success": true, "stdout": "hi\n", "stderr": "oops\n", "returncode": 3})
        );
    }

    #[tokio::test]
    async fn test_timeout_is_an_execution_error() {
        let (status, body) = call(
            json!({"command": "sleep 5", "confirmed": true}),
            Duration::from_millis(100),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("timed out"));
    }

    #[test]
    fn test_missing_fields_default() {
        let payload: ExecutePayload = serde_json::from_value(json!({})).unwrap();
        assert_eq!(payload.command, "");
        assert!(!payload.confirmed);
    }
}
