//! Serde types for the Gemini Live `BidiGenerateContent` message protocol.
//!
//! Outbound messages are externally tagged (`{"setup": {...}}`,
//! `{"realtimeInput": {...}}`, ...). Inbound messages are a single struct of
//! optional members so that unknown or future fields never fail a parse.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// --- Client -> server ---

/// A message sent from the client to the Live API.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(BidiGenerateContentSetup),
    RealtimeInput(BidiGenerateContentRealtimeInput),
    ClientContent(BidiGenerateContentClientContent),
    ToolResponse(BidiGenerateContentToolResponse),
}

/// The first message of every session. Field names are snake_case on the wire.
#[derive(Serialize, Debug, Clone)]
pub struct BidiGenerateContentSetup {
    pub model: String,
    pub generation_config: GenerationConfig,
    pub system_instruction: SystemInstruction,
    pub tools: Vec<Tool>,
}

#[derive(Serialize, Debug, Clone)]
pub struct GenerationConfig {
    pub response_modalities: Vec<ResponseModality>,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseModality {
    Text,
    Audio,
}

#[derive(Serialize, Debug, Clone)]
pub struct SystemInstruction {
    pub parts: Vec<Part>,
}

/// A group of function declarations offered to the model.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Serialize, Debug, Clone)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    /// OpenAPI-style parameter schema.
    pub parameters: Value,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BidiGenerateContentRealtimeInput {
    pub media_chunks: Vec<Blob>,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub data: String,
    pub mime_type: String,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BidiGenerateContentClientContent {
    pub turns: Vec<Content>,
    pub turn_complete: bool,
}

#[derive(Serialize, Debug, Clone)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

#[derive(Serialize, Debug, Clone)]
pub struct Part {
    pub text: String,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BidiGenerateContentToolResponse {
    pub function_responses: Vec<FunctionResponse>,
}

#[derive(Serialize, Debug, Clone)]
pub struct FunctionResponse {
    pub response: Value,
    pub id: String,
}

impl ClientMessage {
    /// A single audio chunk for `realtimeInput`.
    pub fn audio_chunk(data: String, mime_type: &str) -> Self {
        Self::RealtimeInput(BidiGenerateContentRealtimeInput {
            media_chunks: vec![Blob {
                data,
                mime_type: mime_type.to_string(),
            }],
        })
    }

    /// A complete user text turn.
    pub fn user_text(text: String) -> Self {
        Self::ClientContent(BidiGenerateContentClientContent {
            turns: vec![Content {
                role: "user".to_string(),
                parts: vec![Part { text }],
            }],
            turn_complete: true,
        })
    }

    /// A tool response carrying exactly one function response.
    pub fn tool_response(id: String, response: Value) -> Self {
        Self::ToolResponse(BidiGenerateContentToolResponse {
            function_responses: vec![FunctionResponse { response, id }],
        })
    }
}

// --- Server -> client ---

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    pub setup_complete: Option<Value>,
    pub server_content: Option<LiveServerContent>,
    pub tool_call: Option<LiveToolCall>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct LiveServerContent {
    pub model_turn: Option<ServerContentTurn>,
    pub interrupted: Option<bool>,
    pub turn_complete: Option<bool>,
}

#[derive(Deserialize, Debug, Default)]
pub struct ServerContentTurn {
    #[serde(default)]
    pub parts: Vec<ServerPart>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerPart {
    pub text: Option<String>,
    pub inline_data: Option<ServerBlob>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ServerBlob {
    pub data: String,
    pub mime_type: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct LiveToolCall {
    #[serde(default)]
    pub function_calls: Vec<FunctionCall>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct FunctionCall {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl ServerMessage {
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Function calls carried by this message, if it is a non-empty tool call.
    pub fn function_calls(&self) -> Option<&[FunctionCall]> {
        self.tool_call
            .as_ref()
            .map(|call| call.function_calls.as_slice())
            .filter(|calls| !calls.is_empty())
    }

    /// Base64 audio payloads of the model turn, in order. Text parts are skipped.
    pub fn audio_payloads(&self) -> impl Iterator<Item = &str> {
        self.server_content
            .iter()
            .filter_map(|content| content.model_turn.as_ref())
            .flat_map(|turn| turn.parts.iter())
            .filter_map(|part| part.inline_data.as_ref())
            .map(|blob| blob.data.as_str())
    }

    pub fn is_interrupted(&self) -> bool {
        self.server_content
            .as_ref()
            .and_then(|content| content.interrupted)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_setup_uses_snake_case_envelope() {
        let msg = ClientMessage::Setup(BidiGenerateContentSetup {
            model: "models/m".to_string(),
            generation_config: GenerationConfig {
                response_modalities: vec![ResponseModality::Audio],
            },
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: "be brief".to_string(),
                }],
            },
            tools: vec![Tool {
                function_declarations: vec![FunctionDeclaration {
                    name: "display_text".to_string(),
                    description: "show text".to_string(),
                    parameters: json!({"type": "object"}),
                }],
            }],
        });

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({
                "setup": {
                    "model": "models/m",
                    "generation_config": {"response_modalities": ["AUDIO"]},
                    "system_instruction": {"parts": [{"text": "be brief"}]},
                    "tools": [{"functionDeclarations": [{
                        "name": "display_text",
                        "description": "show text",
                        "parameters": {"type": "object"}
                    }]}]
                }
            })
        );
    }

    #[test]
    fn test_outbound_shapes() {
        let audio = serde_json::to_value(ClientMessage::audio_chunk("AAA=".into(), "audio/pcm")).unwrap();
        assert_eq!(
            audio,
            json!({"realtimeInput": {"mediaChunks": [{"data": "AAA=", "mimeType": "audio/pcm"}]}})
        );

        let text = serde_json::to_value(ClientMessage::user_text("hi".into())).unwrap();
        assert_eq!(
            text,
            json!({"clientContent": {"turns": [{"role": "user", "parts": [{"text": "hi"}]}], "turnComplete": true}})
        );

        let response =
            serde_json::to_value(ClientMessage::tool_response("a1".into(), json!({"success": true})))
                .unwrap();
        assert_eq!(
            response,
            json!({"toolResponse": {"functionResponses": [{"response": {"success": true}, "id": "a1"}]}})
        );
    }

    #[test]
    fn test_parse_tool_call() {
        let msg = ServerMessage::parse(
            r#"{"toolCall":{"functionCalls":[{"id":"a1","name":"display_text","args":{"title":"Poem","content":"line1"}}]}}"#,
        )
        .unwrap();
        let calls = msg.function_calls().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "a1");
        assert_eq!(calls[0].name, "display_text");
        assert_eq!(calls[0].args["content"], json!("line1"));
    }

    #[test]
    fn test_audio_payloads_skip_text_parts() {
        let msg = ServerMessage::parse(
            r#"{"serverContent":{"modelTurn":{"parts":[
                {"text":"thinking"},
                {"inlineData":{"data":"AQI=","mimeType":"audio/pcm;rate=24000"}},
                {"inlineData":{"data":"AwQ="}}
            ]}}}"#,
        )
        .unwrap();
        let payloads: Vec<&str> = msg.audio_payloads().collect();
        assert_eq!(payloads, vec!["AQI=", "AwQ="]);
        assert!(!msg.is_interrupted());
        assert!(msg.function_calls().is_none());
    }

    #[test]
    fn test_unknown_fields_are_tolerated() {
        let msg = ServerMessage::parse(
            r#"{"serverContent":{"interrupted":true,"generationComplete":true},"usageMetadata":{"totalTokenCount":3}}"#,
        )
        .unwrap();
        assert!(msg.is_interrupted());
        assert_eq!(msg.audio_payloads().count(), 0);
    }

    #[test]
    fn test_empty_tool_call_is_not_a_tool_call() {
        let msg = ServerMessage::parse(r#"{"toolCall":{}}"#).unwrap();
        assert!(msg.function_calls().is_none());
    }
}
