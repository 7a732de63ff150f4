//! Per-model request overrides.
//!
//! Some upstream models only honour tool calling when the request is shaped a
//! particular way. Each entry names the model and what has to change; adding a
//! new quirk means adding a row here, not another branch in the request builder.

/// A request override tied to one upstream model identifier.
#[derive(Debug, Clone)]
pub struct ModelQuirk {
    pub model: &'static str,
    /// Forced `tool_choice` whenever the request declares tools or functions.
    pub forced_tool_choice: Option<&'static str>,
}

const QUIRKS: &[ModelQuirk] = &[ModelQuirk {
    // Ignores tools unless tool_choice is explicitly "required".
    model: "deepseek-ai/DeepSeek-V3.1",
    forced_tool_choice: Some("required"),
}];

impl ModelQuirk {
    /// Exact, case-sensitive lookup by model id.
    #[must_use]
    pub fn for_model(model: &str) -> Option<&'static ModelQuirk> {
        QUIRKS.iter().find(|q| q.model == model)
    }

    #[must_use]
    pub fn all() -> &'static [ModelQuirk] {
        QUIRKS
    }
}

/// The `tool_choice` the upstream must receive for `model`, if any quirk forces one.
#[must_use]
pub fn forced_tool_choice(model: &str, has_tools: bool) -> Option<&'static str> {
    if !has_tools {
        return None;
    }
    ModelQuirk::for_model(model).and_then(|q| q.forced_tool_choice)
}
