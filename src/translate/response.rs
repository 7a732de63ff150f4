use super::openai_types::{
    ChatCompletionChunk, ChatCompletionResponse, ChatUsage, Choice, ChoiceMessage, ChunkChoice,
    ChunkDelta, CHUNK_OBJECT, COMPLETION_OBJECT,
};
use super::wandb_types::{WandbChatResponse, WandbStreamChunk};

/// Translate a complete W&B response into an OpenAI chat completion.
/// Pure apart from the clock and id generation used for missing fields;
/// `requested_model` is what the client originally asked for.
pub fn wandb_to_openai(resp: &WandbChatResponse, requested_model: &str) -> ChatCompletionResponse {
    let choices = resp
        .choices
        .as_deref()
        .unwrap_or_default()
        .iter()
        .enumerate()
        .map(|(position, choice)| {
            let message = choice.message.as_ref();
            Choice {
                index: choice.index.unwrap_or(position as u64),
                message: ChoiceMessage {
                    role: non_empty(message.and_then(|m| m.role.as_deref()))
                        .unwrap_or("assistant")
                        .to_string(),
                    content: message
                        .and_then(|m| m.content.clone())
                        .unwrap_or_default(),
                    tool_calls: message.and_then(|m| m.tool_calls.clone()),
                },
                finish_reason: map_finish_reason(choice.finish_reason.as_deref()),
            }
        })
        .collect();

    let usage = resp.usage.as_ref().map_or_else(ChatUsage::default, |u| ChatUsage {
        prompt_tokens: u.prompt_tokens.unwrap_or(0),
        completion_tokens: u.completion_tokens.unwrap_or(0),
        total_tokens: u.total_tokens.unwrap_or(0),
    });

    ChatCompletionResponse {
        id: response_id(resp.id.as_deref()),
        object: non_empty(resp.object.as_deref())
            .unwrap_or(COMPLETION_OBJECT)
            .to_string(),
        created: created_or_now(resp.created),
        model: non_empty(resp.model.as_deref())
            .unwrap_or(requested_model)
            .to_string(),
        choices,
        usage,
        system_fingerprint: String::new(),
    }
}

/// Translate one W&B streaming chunk into an OpenAI chunk.
pub fn wandb_chunk_to_openai(chunk: &WandbStreamChunk, requested_model: &str) -> ChatCompletionChunk {
    let choices = chunk
        .choices
        .as_deref()
        .unwrap_or_default()
        .iter()
        .enumerate()
        .map(|(position, choice)| {
            let delta = choice.delta.clone().unwrap_or_default();
            ChunkChoice {
                index: choice.index.unwrap_or(position as u64),
                delta: ChunkDelta {
                    role: delta.role,
                    content: delta.content,
                    tool_calls: delta.tool_calls,
                },
                finish_reason: non_empty(choice.finish_reason.as_deref()).map(String::from),
            }
        })
        .collect();

    ChatCompletionChunk {
        id: response_id(chunk.id.as_deref()),
        object: non_empty(chunk.object.as_deref())
            .unwrap_or(CHUNK_OBJECT)
            .to_string(),
        created: created_or_now(chunk.created),
        model: non_empty(chunk.model.as_deref())
            .unwrap_or(requested_model)
            .to_string(),
        choices,
        system_fingerprint: String::new(),
    }
}

/// `tool_calls` is always preserved; anything else non-empty passes through, empty becomes null.
pub fn map_finish_reason(reason: Option<&str>) -> Option<String> {
    match reason {
        Some("tool_calls") => Some("tool_calls".to_string()),
        other => non_empty(other).map(String::from),
    }
}

/// Fresh opaque completion id, `chatcmpl-` followed by 29 alphanumerics.
pub fn generate_completion_id() -> String {
    let raw = uuid::Uuid::new_v4().simple().to_string();
    format!("chatcmpl-{}", &raw[..29])
}

pub fn unix_now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}

fn response_id(id: Option<&str>) -> String {
    non_empty(id).map_or_else(generate_completion_id, String::from)
}

fn created_or_now(created: Option<u64>) -> u64 {
    created.filter(|c| *c > 0).unwrap_or_else(unix_now)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
