//! Agent-issued tool calls and their correlated responses.
//!
//! Every recognised call ends in exactly one [`ToolResponse`] with the same id,
//! except an `execute` call still awaiting confirmation when the session
//! closes; that one is abandoned. Unknown tool names get no response.

use crate::{
    executor::{CommandExecutor, ExecutionResult},
    ui::{TranscriptEntry, UiCollaborator},
};
use gemini_realtime::FunctionCall;
use serde::Serialize;
use serde_json::{Map, Value};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::mpsc;
use tracing::{info, warn};

const SEARCH_URL: &str = "https://www.google.com/search";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    DisplayText,
    Execute,
    GoogleSearch,
}

impl ToolName {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "display_text" => Some(Self::DisplayText),
            "execute" => Some(Self::Execute),
            "googleSearch" => Some(Self::GoogleSearch),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DisplayText => "display_text",
            Self::Execute => "execute",
            Self::GoogleSearch => "googleSearch",
        }
    }
}

/// A recognised function call from the agent.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: ToolName,
    pub args: Map<String, Value>,
}

impl ToolCall {
    /// Returns `None` for tool names this client does not declare.
    pub fn from_function_call(call: FunctionCall) -> Option<Self> {
        let name = ToolName::parse(&call.name)?;
        Some(Self {
            id: call.id,
            name,
            args: call.args,
        })
    }

    /// A string argument. Non-string values are rendered as JSON text.
    pub fn arg(&self, key: &str) -> Option<String> {
        match self.args.get(key)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// The `response` object of a function response.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

impl ToolResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn cancelled() -> Self {
        Self {
            success: false,
            cancelled: Some(true),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn searched(query: String) -> Self {
        Self {
            success: true,
            query: Some(query),
            ..Default::default()
        }
    }

    pub fn executed(result: &ExecutionResult) -> Self {
        Self {
            success: result.success,
            output: result.stdout.clone(),
            error: result.stderr.clone().or_else(|| result.error.clone()),
            ..Default::default()
        }
    }
}

/// A tool result correlated with its call id.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResponse {
    pub id: String,
    pub payload: ToolResult,
}

impl ToolResponse {
    pub fn new(id: impl Into<String>, payload: ToolResult) -> Self {
        Self {
            id: id.into(),
            payload,
        }
    }
}

pub struct ToolCallDispatcher {
    ui: Arc<dyn UiCollaborator>,
    executor: Arc<dyn CommandExecutor>,
    /// `execute` calls awaiting the user's decision, keyed by call id.
    pending: HashMap<String, String>,
    completions: mpsc::UnboundedSender<ToolResponse>,
}

impl ToolCallDispatcher {
    /// Responses that complete asynchronously (confirmed executions) are
    /// delivered on `completions`.
    pub fn new(
        ui: Arc<dyn UiCollaborator>,
        executor: Arc<dyn CommandExecutor>,
        completions: mpsc::UnboundedSender<ToolResponse>,
    ) -> Self {
        Self {
            ui,
            executor,
            pending: HashMap::new(),
            completions,
        }
    }

    /// Runs one call. Returns the response when it is available immediately;
    /// `None` when the call is suspended awaiting confirmation or ignored.
    pub fn dispatch(&mut self, call: ToolCall) -> Option<ToolResponse> {
        info!(call_id = %call.id, tool = call.name.as_str(), "Dispatching tool call");
        match call.name {
            ToolName::DisplayText => {
                self.ui.append(TranscriptEntry::Written {
                    title: call.arg("title").filter(|t| !t.is_empty()),
                    content: call.arg("content").unwrap_or_default(),
                });
                Some(ToolResponse::new(call.id, ToolResult::ok()))
            }
            ToolName::Execute => {
                if self.pending.contains_key(&call.id) {
                    warn!(call_id = %call.id, "Ignoring duplicate execute call while one is pending");
                    return None;
                }
                let command = call.arg("command").unwrap_or_default();
                self.ui.append(TranscriptEntry::ConfirmCommand {
                    call_id: call.id.clone(),
                    command: command.clone(),
                });
                self.pending.insert(call.id, command);
                None
            }
            ToolName::GoogleSearch => {
                let query = call.arg("query").unwrap_or_default();
                match reqwest::Url::parse_with_params(SEARCH_URL, &[("q", query.as_str())]) {
                    Ok(url) => self.ui.open_url(url.as_str()),
                    Err(e) => warn!("Could not build search URL: {}", e),
                }
                self.ui.append(TranscriptEntry::Search {
                    query: query.clone(),
                });
                Some(ToolResponse::new(call.id, ToolResult::searched(query)))
            }
        }
    }

    /// The user confirmed a pending `execute`. The command is sent to the
    /// execution service in the background; its response arrives on the
    /// completions channel. Returns false when no such call is pending.
    pub fn confirm(&mut self, call_id: &str) -> bool {
        let Some(command) = self.pending.remove(call_id) else {
            warn!(call_id, "Confirm for unknown or already resolved call");
            return false;
        };
        self.ui.dismiss_confirmation(call_id);
        info!(call_id, %command, "Command confirmed by user");

        let executor = self.executor.clone();
        let ui = self.ui.clone();
        let completions = self.completions.clone();
        let call_id = call_id.to_string();
        tokio::spawn(async move {
            let payload = match executor.execute(&command).await {
                Ok(result) => {
                    let output = result
                        .stdout
                        .clone()
                        .filter(|s| !s.is_empty())
                        .or_else(|| result.stderr.clone().filter(|s| !s.is_empty()))
                        .unwrap_or_else(|| "Command executed".to_string());
                    // A closed channel means the session was torn down and its
                    // transcript cleared while the command ran.
                    if !completions.is_closed() {
                        ui.append(TranscriptEntry::CommandResult {
                            call_id: call_id.clone(),
                            output,
                        });
                    }
                    ToolResult::executed(&result)
                }
                Err(e) => {
                    warn!(call_id = %call_id, error = ?e, "Execution request failed");
                    ToolResult::failed(format!("{:#}", e))
                }
            };
            if completions.send(ToolResponse::new(call_id, payload)).is_err() {
                info!("Session closed before the command finished; dropping its response.");
            }
        });
        true
    }

    /// The user cancelled a pending `execute`.
    pub fn cancel(&mut self, call_id: &str) -> Option<ToolResponse> {
        if self.pending.remove(call_id).is_none() {
            warn!(call_id, "Cancel for unknown or already resolved call");
            return None;
        }
        self.ui.dismiss_confirmation(call_id);
        info!(call_id, "Command cancelled by user");
        Some(ToolResponse::new(call_id, ToolResult::cancelled()))
    }

    pub fn is_pending(&self, call_id: &str) -> bool {
        self.pending.contains_key(call_id)
    }

    /// Drops every call still awaiting confirmation. No responses are produced.
    pub fn abandon_all(&mut self) {
        if !self.pending.is_empty() {
            info!(count = self.pending.len(), "Abandoning pending execute calls");
            self.pending.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::MockCommandExecutor;
    use crate::testing::{RecordingUi, UiEvent};
    use anyhow::anyhow;
    use serde_json::json;

    fn call(id: &str, name: ToolName, args: Value) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name,
            args: args.as_object().cloned().unwrap_or_default(),
        }
    }

    fn dispatcher(
        executor: MockCommandExecutor,
    ) -> (
        ToolCallDispatcher,
        Arc<RecordingUi>,
        mpsc::UnboundedReceiver<ToolResponse>,
    ) {
        let ui = Arc::new(RecordingUi::default());
        let (tx, rx) = mpsc::unbounded_channel();
        (
            ToolCallDispatcher::new(ui.clone(), Arc::new(executor), tx),
            ui,
            rx,
        )
    }

    #[test]
    fn test_tool_name_round_trip() {
        for name in [ToolName::DisplayText, ToolName::Execute, ToolName::GoogleSearch] {
            assert_eq!(ToolName::parse(name.as_str()), Some(name));
        }
        assert_eq!(ToolName::parse("launch_rocket"), None);
    }

    #[test]
    fn test_unknown_function_call_is_not_a_tool_call() {
        let fc = FunctionCall {
            id: "z9".to_string(),
            name: "launch_rocket".to_string(),
            args: Map::new(),
        };
        assert!(ToolCall::from_function_call(fc).is_none());
    }

    #[test]
    fn test_result_serialization_omits_unset_fields() {
        assert_eq!(serde_json::to_value(ToolResult::ok()).unwrap(), json!({"success": true}));
        assert_eq!(
            serde_json::to_value(ToolResult::cancelled()).unwrap(),
            json!({"success": false, "cancelled": true})
        );
        assert_eq!(
            serde_json::to_value(ToolResult::searched("rust".into())).unwrap(),
            json!({"success": true, "query": "rust"})
        );
    }

    #[test]
    fn test_display_text_appends_and_responds() {
        let (mut dispatcher, ui, _rx) = dispatcher(MockCommandExecutor::new());
        let response = dispatcher
            .dispatch(call(
                "a1",
                ToolName::DisplayText,
                json!({"title": "Poem", "content": "line1"}),
            ))
            .unwrap();

        assert_eq!(response, ToolResponse::new("a1", ToolResult::ok()));
        assert_eq!(
            ui.entries(),
            vec![TranscriptEntry::Written {
                title: Some("Poem".to_string()),
                content: "line1".to_string()
            }]
        );
    }

    #[test]
    fn test_search_opens_view_and_echoes_query() {
        let (mut dispatcher, ui, _rx) = dispatcher(MockCommandExecutor::new());
        let response = dispatcher
            .dispatch(call("s1", ToolName::GoogleSearch, json!({"query": "rust lang"})))
            .unwrap();

        assert_eq!(response.payload, ToolResult::searched("rust lang".to_string()));
        assert!(ui.events().contains(&UiEvent::OpenUrl(
            "https://www.google.com/search?q=rust+lang".to_string()
        )));
    }

    #[test]
    fn test_cancel_responds_without_executing() {
        let mut executor = MockCommandExecutor::new();
        executor.expect_execute().times(0);
        let (mut dispatcher, ui, _rx) = dispatcher(executor);

        assert!(dispatcher
            .dispatch(call("b2", ToolName::Execute, json!({"command": "ls"})))
            .is_none());
        assert!(dispatcher.is_pending("b2"));

        let response = dispatcher.cancel("b2").unwrap();
        assert_eq!(response, ToolResponse::new("b2", ToolResult::cancelled()));
        assert!(!dispatcher.is_pending("b2"));
        assert!(dispatcher.cancel("b2").is_none());
        assert!(ui.events().contains(&UiEvent::Dismiss("b2".to_string())));
    }

    #[tokio::test]
    async fn test_result_after_teardown_is_not_shown() {
        let executed = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = executed.clone();
        let mut executor = MockCommandExecutor::new();
        executor.expect_execute().times(1).returning(move |_| {
            flag.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(ExecutionResult {
                success: true,
                stdout: Some("late\n".to_string()),
                stderr: None,
                error: None,
            })
        });
        let (mut dispatcher, ui, rx) = dispatcher(executor);

        dispatcher.dispatch(call("d4", ToolName::Execute, json!({"command": "sleep 1"})));
        drop(rx);
        assert!(dispatcher.confirm("d4"));

        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert!(executed.load(std::sync::atomic::Ordering::SeqCst));
        assert!(
            !ui.entries()
                .iter()
                .any(|entry| matches!(entry, TranscriptEntry::CommandResult { .. }))
        );
    }

    #[tokio::test]
    async fn test_confirm_executes_and_reports_output() {
        let mut executor = MockCommandExecutor::new();
        executor
            .expect_execute()
            .withf(|command| command.to_string() == "echo hi")
            .times(1)
            .returning(|_| {
                Ok(ExecutionResult {
                    success: true,
                    stdout: Some("hi\n".to_string()),
                    stderr: Some(String::new()),
                    error: None,
                })
            });
        let (mut dispatcher, ui, mut rx) = dispatcher(executor);

        dispatcher.dispatch(call("c3", ToolName::Execute, json!({"command": "echo hi"})));
        assert!(dispatcher.confirm("c3"));
        assert!(!dispatcher.confirm("c3"));

        let response = rx.recv().await.unwrap();
        assert_eq!(response.id, "c3");
        assert_eq!(
            serde_json::to_value(&response.payload).unwrap(),
            json!({"success": true, "output": "hi\n", "error": ""})
        );
        assert!(ui.entries().contains(&TranscriptEntry::CommandResult {
            call_id: "c3".to_string(),
            output: "hi\n".to_string()
        }));
    }

    #[tokio::test]
    async fn test_execution_failure_becomes_failed_response() {
        let mut executor = MockCommandExecutor::new();
        executor
            .expect_execute()
            .returning(|_| Err(anyhow!("connection refused")));
        let (mut dispatcher, _ui, mut rx) = dispatcher(executor);

        dispatcher.dispatch(call("d4", ToolName::Execute, json!({"command": "uptime"})));
        dispatcher.confirm("d4");

        let response = rx.recv().await.unwrap();
        assert_eq!(response.id, "d4");
        assert!(!response.payload.success);
        assert_eq!(response.payload.error.as_deref(), Some("connection refused"));
    }

    #[test]
    fn test_duplicate_pending_execute_is_ignored() {
        let (mut dispatcher, ui, _rx) = dispatcher(MockCommandExecutor::new());
        dispatcher.dispatch(call("e5", ToolName::Execute, json!({"command": "ls"})));
        dispatcher.dispatch(call("e5", ToolName::Execute, json!({"command": "rm -rf /"})));

        let prompts = ui
            .entries()
            .into_iter()
            .filter(|e| matches!(e, TranscriptEntry::ConfirmCommand { .. }))
            .count();
        assert_eq!(prompts, 1);
        assert_eq!(dispatcher.cancel("e5").map(|r| r.id), Some("e5".to_string()));
    }

    #[test]
    fn test_abandon_all_drops_pending_silently() {
        let mut executor = MockCommandExecutor::new();
        executor.expect_execute().times(0);
        let (mut dispatcher, _ui, mut rx) = dispatcher(executor);
        dispatcher.dispatch(call("f6", ToolName::Execute, json!({"command": "ls"})));

        dispatcher.abandon_all();
        assert!(!dispatcher.is_pending("f6"));
        assert!(!dispatcher.confirm("f6"));
        assert!(rx.try_recv().is_err());
    }
}
