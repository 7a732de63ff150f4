//! Model catalog translation.

use super::openai_types::{ModelInfo, ModelListResponse};
use super::response::unix_now;
use super::wandb_types::WandbModel;

/// Translate the W&B model catalog into an OpenAI model list, preserving order.
///
/// W&B does not report a stable creation time, so `created` is the time of the
/// request and carries no meaning beyond that.
pub fn wandb_models_to_openai(models: &[WandbModel]) -> ModelListResponse {
    let created = unix_now();
    let data = models
        .iter()
        .map(|m| ModelInfo {
            id: m
                .id
                .clone()
                .filter(|id| !id.is_empty())
                .or_else(|| m.name.clone())
                .unwrap_or_default(),
            object: "model".to_string(),
            created,
            owned_by: m
                .owned_by
                .clone()
                .filter(|o| !o.is_empty())
                .unwrap_or_else(|| "wandb".to_string()),
        })
        .collect();

    ModelListResponse {
        object: "list".to_string(),
        data,
    }
}
