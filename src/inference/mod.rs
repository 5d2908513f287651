pub mod client;
pub mod fence;
pub mod gemini;
pub mod sse;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use crate::{error::AppResult, model::chat::Role};

pub use client::{GenerationClient, StreamingGeneration};
pub use gemini::GeminiProvider;

/// Model ids that can only answer with images.
pub const IMAGE_ONLY_MODELS: &[&str] = &[
    "models/gemini-2.0-flash-preview-image-generation",
    "models/gemini-2.5-flash-image-preview",
];

/// Substitute used when an image-only model is asked for text or code.
pub const FALLBACK_TEXT_MODEL: &str = "models/gemini-2.5-flash";

pub const TEXT_MODELS: &[&str] = &[
    "models/gemini-2.5-flash",
    "models/gemini-2.5-pro",
    "models/gemini-2.0-flash",
    "models/gemini-1.5-flash",
    "models/gemini-1.5-pro",
];

pub type TextStream = Pin<Box<dyn Stream<Item = AppResult<String>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modality {
    Text,
    TextAndImage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderTurn {
    pub role: Role,
    pub text: String,
}

/// One call to the hosted model, already validated and with the final model id.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderRequest {
    pub api_key: String,
    pub model: String,
    /// Kept apart from `turns`; providers send it in their system-level field.
    pub system_instruction: Option<String>,
    pub turns: Vec<ProviderTurn>,
    pub modality: Modality,
}

impl ProviderRequest {
    pub fn single_prompt(api_key: &str, model: &str, prompt: String) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            system_instruction: None,
            turns: vec![ProviderTurn {
                role: Role::User,
                text: prompt,
            }],
            modality: Modality::Text,
        }
    }
}

impl std::fmt::Debug for ProviderRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRequest")
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("system_instruction", &self.system_instruction)
            .field("turns", &self.turns.len())
            .field("modality", &self.modality)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderPart {
    Text(String),
    /// Base64 payload exactly as the provider sent it.
    InlineImage { mime_type: String, data: String },
}

#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Buffered round trip: every part of the first candidate, in order.
    async fn generate(&self, request: &ProviderRequest) -> AppResult<Vec<ProviderPart>>;

    /// Incremental round trip. Dropping the stream closes the transport.
    async fn stream(&self, request: &ProviderRequest) -> AppResult<TextStream>;
}

pub fn is_image_only(model: &str) -> bool {
    let normalized = qualified_model(model);
    IMAGE_ONLY_MODELS.iter().any(|m| *m == normalized)
}

/// Model id actually used for a text/code request.
pub fn text_model_for(requested: &str) -> String {
    if is_image_only(requested) {
        FALLBACK_TEXT_MODEL.to_string()
    } else {
        requested.trim().to_string()
    }
}

/// `gemini-2.5-flash` and `models/gemini-2.5-flash` name the same model.
pub fn qualified_model(model: &str) -> String {
    let model = model.trim();
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}
