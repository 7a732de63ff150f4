//! Types for the W&B Inference API (the upstream we forward to).
//!
//! Requests are fully specified by us. Responses are loose: every field is optional
//! and a field of the wrong type reads as absent, so a minimal or odd upstream
//! payload still deserializes and the translation layer can fill in defaults.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Number, Value};

use super::openai_types::{MessageContent, ToolChoice};

// ---------------------------------------------------------------------------
// Request types (what we send TO W&B)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WandbChatRequest {
    pub model: String,
    pub messages: Vec<WandbMessage>,
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
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
}

/// Upstream messages carry only a role and content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WandbMessage {
    pub role: String,
    pub content: Option<MessageContent>,
}

// ---------------------------------------------------------------------------
// Response types (what W&B sends back)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WandbChatResponse {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub object: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub created: Option<u64>,
    #[serde(default, deserialize_with = "lenient")]
    pub model: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub choices: Option<Vec<WandbChoice>>,
    #[serde(default, deserialize_with = "lenient")]
    pub usage: Option<WandbUsage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WandbChoice {
    #[serde(default, deserialize_with = "lenient_u64")]
    pub index: Option<u64>,
    #[serde(default, deserialize_with = "lenient")]
    pub message: Option<WandbChoiceMessage>,
    #[serde(default, deserialize_with = "lenient")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WandbChoiceMessage {
    #[serde(default, deserialize_with = "lenient")]
    pub role: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WandbUsage {
    #[serde(default, deserialize_with = "lenient_u64")]
    pub prompt_tokens: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub completion_tokens: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub total_tokens: Option<u64>,
}

// ---------------------------------------------------------------------------
// Streaming chunk types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WandbStreamChunk {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub object: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub created: Option<u64>,
    #[serde(default, deserialize_with = "lenient")]
    pub model: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub choices: Option<Vec<WandbStreamChoice>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WandbStreamChoice {
    #[serde(default, deserialize_with = "lenient_u64")]
    pub index: Option<u64>,
    #[serde(default, deserialize_with = "lenient")]
    pub delta: Option<WandbDelta>,
    #[serde(default, deserialize_with = "lenient")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WandbDelta {
    #[serde(default, deserialize_with = "lenient")]
    pub role: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Value>,
}

// ---------------------------------------------------------------------------
// Model catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WandbModel {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub owned_by: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WandbModelList {
    #[serde(default, deserialize_with = "lenient")]
    pub data: Option<Vec<WandbModel>>,
}

// ---------------------------------------------------------------------------
// Lenient field readers
// ---------------------------------------------------------------------------

/// Read a field as `T`, or as absent if it has some other shape.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

/// Read a non-negative whole number, accepting float encodings such as `1701234567.0`.
fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(whole_number))
}

fn whole_number(value: &Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    value
        .as_f64()
        .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
        .map(|f| f as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_response_deserializes() {
        let resp: WandbChatResponse = serde_json::from_value(json!({})).unwrap();
        assert!(resp.id.is_none());
        assert!(resp.choices.is_none());
        assert!(resp.usage.is_none());
    }

    #[test]
    fn test_float_created_is_accepted() {
        let resp: WandbChatResponse = serde_json::from_value(json!({
            "created": 1701234567.0,
            "choices": [{"index": 0.0, "message": {"content": "hi"}}],
            "usage": {"prompt_tokens": 5.0, "completion_tokens": 3, "total_tokens": 8}
        }))
        .unwrap();

        assert_eq!(resp.created, Some(1701234567));
        let choices = resp.choices.unwrap();
        assert_eq!(choices[0].index, Some(0));
        assert_eq!(resp.usage.unwrap().prompt_tokens, Some(5));
    }

    #[test]
    fn test_wrong_field_types_read_as_absent() {
        let resp: WandbChatResponse = serde_json::from_value(json!({
            "id": 42,
            "created": "yesterday",
            "model": ["m"],
            "choices": [{
                "index": 1.5,
                "message": {"role": null, "content": [{"type": "text", "text": "hi"}]},
                "finish_reason": 3
            }],
            "usage": "n/a"
        }))
        .unwrap();

        assert!(resp.id.is_none());
        assert!(resp.created.is_none());
        assert!(resp.model.is_none());
        assert!(resp.usage.is_none());
        let choice = &resp.choices.unwrap()[0];
        assert!(choice.index.is_none());
        assert!(choice.finish_reason.is_none());
        let message = choice.message.as_ref().unwrap();
        assert!(message.role.is_none());
        assert!(message.content.is_none());
    }

    #[test]
    fn test_negative_and_fractional_numbers_rejected() {
        assert_eq!(whole_number(&json!(3)), Some(3));
        assert_eq!(whole_number(&json!(1.5e9)), Some(1_500_000_000));
        assert_eq!(whole_number(&json!(-1)), None);
        assert_eq!(whole_number(&json!(2.5)), None);
        assert_eq!(whole_number(&json!("7")), None);
    }

    #[test]
    fn test_odd_stream_chunk_still_parses() {
        let chunk: WandbStreamChunk = serde_json::from_value(json!({
            "created": 1.5e9,
            "choices": [{"index": "0", "delta": {"content": "x"}}]
        }))
        .unwrap();

        assert_eq!(chunk.created, Some(1_500_000_000));
        let choice = &chunk.choices.unwrap()[0];
        assert!(choice.index.is_none());
        assert_eq!(choice.delta.as_ref().unwrap().content.as_deref(), Some("x"));
    }

    #[test]
    fn test_request_omits_absent_fields() {
        let req = WandbChatRequest {
            model: "m".to_string(),
            messages: vec![],
            temperature: None,
            max_tokens: Some(Number::from(10)),
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
            stream: None,
            tools: None,
            tool_choice: None,
        };
        let value = serde_json::to_value(&req).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj.len(), 3);
        assert_eq!(obj["max_tokens"], json!(10));
        assert!(!obj.contains_key("temperature"));
    }
}
