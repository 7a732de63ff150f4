//! Build W&B chat requests from OpenAI-style client requests.
//!
//! Legacy request shapes are folded into their current equivalents first
//! (`prompt` into `messages`, `functions` into `tools`, `function_call` into
//! `tool_choice`), so the rest of the builder only ever sees one shape.

use serde_json::{json, Value};

use super::openai_types::{ChatCompletionRequest, ChatMessage, FunctionCallChoice, ToolChoice};
use super::wandb_types::{WandbChatRequest, WandbMessage};
use crate::quirks;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Translate a client chat request into the upstream request.
/// Pure function: never fails, the client request is not modified.
pub fn build_upstream_request(
    req: &ChatCompletionRequest,
    default_system_prompt: &str,
) -> WandbChatRequest {
    let messages = normalize_messages(req, default_system_prompt)
        .into_iter()
        .map(|m| WandbMessage {
            role: m.role,
            content: m.content,
        })
        .collect();

    let tools = normalize_tools(req);
    let tool_choice = resolve_tool_choice(req);

    WandbChatRequest {
        model: req.model.clone(),
        messages,
        temperature: req.temperature.clone(),
        max_tokens: req.max_tokens.clone(),
        top_p: req.top_p.clone(),
        frequency_penalty: req.frequency_penalty.clone(),
        presence_penalty: req.presence_penalty.clone(),
        stream: req.stream,
        tools,
        tool_choice,
    }
}

/// The conversation to send upstream.
///
/// A default system message is prepended when the client sent none. A legacy
/// `prompt` then replaces the whole conversation with a single user turn.
pub fn normalize_messages(req: &ChatCompletionRequest, default_system_prompt: &str) -> Vec<ChatMessage> {
    if let Some(ref prompt) = req.prompt {
        return vec![ChatMessage::new("user", prompt.clone())];
    }

    let mut messages = req.messages.clone();
    if !messages.iter().any(|m| m.role == "system") {
        messages.insert(0, ChatMessage::new("system", default_system_prompt));
    }
    messages
}

/// `tools` wins; otherwise each legacy function becomes a function tool.
pub fn normalize_tools(req: &ChatCompletionRequest) -> Option<Vec<Value>> {
    if let Some(ref tools) = req.tools {
        return Some(tools.clone());
    }

    req.functions.as_ref().map(|functions| {
        functions
            .iter()
            .map(|f| json!({"type": "function", "function": f}))
            .collect()
    })
}

/// Resolve the upstream `tool_choice`: model quirks, then `tool_choice`, then
/// legacy `function_call`. `None` means the field is omitted.
pub fn resolve_tool_choice(req: &ChatCompletionRequest) -> Option<ToolChoice> {
    let has_tools = req.tools.is_some() || req.functions.is_some();
    if let Some(forced) = quirks::forced_tool_choice(&req.model, has_tools) {
        return Some(ToolChoice::Mode(forced.to_string()));
    }

    if let Some(ref choice) = req.tool_choice {
        return Some(choice.clone());
    }

    req.function_call.as_ref().map(translate_function_call)
}

fn translate_function_call(fc: &FunctionCallChoice) -> ToolChoice {
    match fc {
        FunctionCallChoice::Named(f) => ToolChoice::function(f.name.clone()),
        FunctionCallChoice::Mode(mode) => ToolChoice::Mode(mode.clone()),
        FunctionCallChoice::Other(value) => ToolChoice::Other(value.clone()),
    }
}
