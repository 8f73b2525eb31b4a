//! The session `setup` payload: model, modality, system instruction, and the
//! declared tool capabilities.

use crate::tools::ToolName;
use gemini_realtime::types::{
    BidiGenerateContentSetup, ClientMessage, FunctionDeclaration, GenerationConfig, Part,
    ResponseModality, SystemInstruction, Tool,
};
use serde_json::json;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-native-audio-preview-12-2025";

pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are a helpful and friendly AI assistant.

When users ask you to write, create, generate, or show content like poems, code, stories, recipes, or lists:
1. Call the display_text function with the content - do NOT speak about calling the function
2. Only say a brief natural response like \"Here you go!\" or \"Here's what you asked for\"

When users ask you to execute shell commands:
1. Call the execute function with the shell command
2. Wait for confirmation from the user
3. The command will be executed after confirmation

When users ask you to search something on Google, use the googleSearch function.

For normal conversation, just speak naturally.

Do not narrate your actions or explain what you're doing - just do it.";

/// Static settings for every session created by a controller.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Model identifier without the `models/` prefix.
    pub model: String,
    pub system_instruction: String,
    /// Base WebSocket URL; the credential is appended as `?key=`.
    pub live_api_url: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            live_api_url: gemini_realtime::DEFAULT_LIVE_API_URL.to_string(),
        }
    }
}

impl SessionConfig {
    pub fn setup_message(&self) -> ClientMessage {
        ClientMessage::Setup(BidiGenerateContentSetup {
            model: format!("models/{}", self.model),
            generation_config: GenerationConfig {
                response_modalities: vec![ResponseModality::Audio],
            },
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: self.system_instruction.clone(),
                }],
            },
            tools: vec![Tool {
                function_declarations: tool_declarations(),
            }],
        })
    }
}

/// Declarations for `display_text`, `execute`, and `googleSearch`.
pub fn tool_declarations() -> Vec<FunctionDeclaration> {
    vec![
        FunctionDeclaration {
            name: ToolName::DisplayText.as_str().to_string(),
            description: "Display text content to the user without speaking it aloud. Use this for poems, code, long-form content, lists, or anything the user asks you to write.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "title": {
                        "type": "string",
                        "description": "A brief title or label for the content (e.g., \"Poem\", \"Python Code\", \"Recipe\")"
                    },
                    "content": {
                        "type": "string",
                        "description": "The actual text content to display"
                    }
                },
                "required": ["content"]
            }),
        },
        FunctionDeclaration {
            name: ToolName::Execute.as_str().to_string(),
            description: "Execute a shell command. The command will be shown to the user for confirmation before execution.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "The shell command to execute"
                    }
                },
                "required": ["command"]
            }),
        },
        FunctionDeclaration {
            name: ToolName::GoogleSearch.as_str().to_string(),
            description: "Search Google for information".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query"
                    }
                },
                "required": ["query"]
            }),
        },
    ]
}
