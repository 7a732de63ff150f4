//! Client-facing types for the [OpenAI Chat Completions API](https://platform.openai.com/docs/api-reference/chat).
//!
//! The request side is what callers send us (including the legacy `prompt`,
//! `functions` and `function_call` fields); the response side is what we send back.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::HashMap;

pub const COMPLETION_OBJECT: &str = "chat.completion";
pub const CHUNK_OBJECT: &str = "chat.completion.chunk";

// ---------------------------------------------------------------------------
// Request types (what clients send TO us)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    /// Legacy completion-style input. Replaces `messages` when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    // Sampling numbers are kept as parsed so they reach upstream unmodified
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<Number>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<Number>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<Number>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<Number>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<Number>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    /// Forwarded verbatim, whatever the tool type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    /// Legacy function specs; each becomes `{"type": "function", "function": <spec>}`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub functions: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCallChoice>,
    // Catch-all for fields we accept but never forward
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<MessageContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_call: Option<Value>,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: Some(MessageContent::Text(content.into())),
            name: None,
            function_call: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<Value>),
}

/// `tool_choice`: a mode string (`"auto"`, `"none"`, `"required"`), a named
/// function, or any other object (e.g. `allowed_tools`), which is kept as sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolChoice {
    Mode(String),
    Function(NamedToolChoice),
    Other(Value),
}

impl ToolChoice {
    pub fn function(name: impl Into<String>) -> Self {
        Self::Function(NamedToolChoice {
            choice_type: "function".to_string(),
            function: FunctionName { name: name.into() },
        })
    }
}

// Strict so that objects with more keys fall through to `ToolChoice::Other`
// instead of losing them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NamedToolChoice {
    #[serde(rename = "type")]
    pub choice_type: String, // "function"
    pub function: FunctionName,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FunctionName {
    pub name: String,
}

/// Legacy `function_call`: a mode string, `{"name": ...}`, or anything else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FunctionCallChoice {
    Mode(String),
    Named(LegacyFunctionCall),
    Other(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyFunctionCall {
    pub name: String,
}

// ---------------------------------------------------------------------------
// Response types (what we send back)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: ChatUsage,
    pub system_fingerprint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: u64,
    pub message: ChoiceMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceMessage {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

// ---------------------------------------------------------------------------
// Streaming chunk types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
    pub system_fingerprint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub index: u64,
    pub delta: ChunkDelta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Value>,
}

// ---------------------------------------------------------------------------
// Model list
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub owned_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelListResponse {
    pub object: String,
    pub data: Vec<ModelInfo>,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: String,
}

impl ErrorResponse {
    pub fn new(error_type: &str, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                message: message.into(),
                error_type: error_type.to_string(),
            },
        }
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::new("invalid_request_error", msg)
    }

    pub fn api_error(msg: impl Into<String>) -> Self {
        Self::new("api_error", msg)
    }

    pub fn server_error(msg: impl Into<String>) -> Self {
        Self::new("server_error", msg)
    }

    pub fn configuration_error(msg: impl Into<String>) -> Self {
        Self::new("configuration_error", msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_accepts_legacy_fields() {
        let req: ChatCompletionRequest = serde_json::from_value(json!({
            "model": "m",
            "prompt": "hi",
            "functions": [{"name": "f", "parameters": {"type": "object"}}],
            "function_call": {"name": "f"},
            "user": "someone"
        }))
        .unwrap();

        assert!(req.messages.is_empty());
        assert_eq!(req.prompt.as_deref(), Some("hi"));
        assert_eq!(req.functions.as_ref().map(Vec::len), Some(1));
        assert_eq!(
            req.function_call,
            Some(FunctionCallChoice::Named(LegacyFunctionCall {
                name: "f".to_string()
            }))
        );
        assert!(req.extra.contains_key("user"));
    }

    #[test]
    fn test_tool_choice_shapes() {
        let mode: ToolChoice = serde_json::from_value(json!("auto")).unwrap();
        assert_eq!(mode, ToolChoice::Mode("auto".to_string()));

        let named: ToolChoice =
            serde_json::from_value(json!({"type": "function", "function": {"name": "f"}})).unwrap();
        assert_eq!(named, ToolChoice::function("f"));

        let allowed = json!({
            "type": "allowed_tools",
            "allowed_tools": {"mode": "auto", "tools": [{"type": "function", "function": {"name": "f"}}]}
        });
        let other: ToolChoice = serde_json::from_value(allowed.clone()).unwrap();
        assert_eq!(other, ToolChoice::Other(allowed.clone()));
        assert_eq!(serde_json::to_value(&other).unwrap(), allowed);

        // Extra keys on a named choice are not dropped.
        let extended = json!({"type": "function", "function": {"name": "f", "strict": true}});
        let other: ToolChoice = serde_json::from_value(extended.clone()).unwrap();
        assert_eq!(serde_json::to_value(&other).unwrap(), extended);
    }

    #[test]
    fn test_sampling_numbers_kept_as_sent() {
        let req: ChatCompletionRequest = serde_json::from_value(json!({
            "model": "m",
            "messages": [],
            "max_tokens": 100.0,
            "temperature": 1
        }))
        .unwrap();

        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["max_tokens"], json!(100.0));
        assert_eq!(value["temperature"], json!(1));
    }

    #[test]
    fn test_unusual_function_call_kept() {
        let req: ChatCompletionRequest = serde_json::from_value(json!({
            "model": "m",
            "function_call": {"mode": "any"}
        }))
        .unwrap();
        assert_eq!(
            req.function_call,
            Some(FunctionCallChoice::Other(json!({"mode": "any"})))
        );
    }

    #[test]
    fn test_message_content_variants() {
        let msg: ChatMessage = serde_json::from_value(json!({
            "role": "user",
            "content": [{"type": "text", "text": "hi"}]
        }))
        .unwrap();
        assert!(matches!(msg.content, Some(MessageContent::Parts(ref p)) if p.len() == 1));

        let msg: ChatMessage =
            serde_json::from_value(json!({"role": "assistant", "content": null})).unwrap();
        assert!(msg.content.is_none());
    }

    #[test]
    fn test_error_body_shape() {
        let value = serde_json::to_value(ErrorResponse::invalid_request("bad")).unwrap();
        assert_eq!(
            value,
            json!({"error": {"message": "bad", "type": "invalid_request_error"}})
        );
    }
}
