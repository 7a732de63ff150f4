//! API translation between the OpenAI and W&B Inference formats.
//!
//! The core of the proxy: builds upstream requests, and converts responses,
//! streaming events and model catalogs back. All translation functions are pure (no I/O).

pub mod models;
pub mod openai_types;
pub mod request;
pub mod response;
pub mod streaming;
pub mod wandb_types;
