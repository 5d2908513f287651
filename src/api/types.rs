use serde::{Deserialize, Serialize};

use crate::{
    model::{
        chat::ChatMessage,
        generation::{GeneratedImage, GenerationRequest, GenerationResult},
    },
    preview::{PreviewDocument, PreviewKind},
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub code: String,
    pub model: String,
    #[serde(rename = "type")]
    pub generation_type: &'static str,
    pub raw_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub design_spec: Option<String>,
}

impl GenerateResponse {
    pub fn new(request: &GenerationRequest, result: GenerationResult) -> Self {
        Self {
            code: result.extracted_code,
            model: result.model_used,
            generation_type: request.generation_type.as_str(),
            raw_text: result.raw_text,
            design_spec: result.design_spec,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRouteRequest {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
}

impl ImageRouteRequest {
    pub fn wants_images(&self) -> bool {
        self.output
            .as_deref()
            .is_some_and(|o| o.trim().eq_ignore_ascii_case("image"))
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ImageRouteResponse {
    #[serde(rename_all = "camelCase")]
    Images {
        images: Vec<GeneratedImage>,
        model_used: String,
    },
    #[serde(rename_all = "camelCase")]
    Design {
        design_spec: String,
        code: String,
        model_used: String,
        style: String,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRouteRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub agent_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMessageRequest {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PreviewRequest {
    #[serde(default)]
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    pub kind: PreviewKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    pub document: String,
    pub frame: String,
}

impl PreviewResponse {
    pub fn new(doc: PreviewDocument, frame: String) -> Self {
        Self {
            kind: doc.kind,
            component: doc.component,
            document: doc.html,
            frame,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub id: String,
    pub deleted: bool,
}

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub text: &'static [&'static str],
    pub image: &'static [&'static str],
    pub fallback: &'static str,
}
