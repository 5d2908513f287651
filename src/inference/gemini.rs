//! Google Gemini REST provider (`generateContent` / `streamGenerateContent`).

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument, warn};

use super::{
    qualified_model, sse::SseDecoder, Modality, ModelProvider, ProviderPart, ProviderRequest,
    TextStream,
};
use crate::{
    config::DEFAULT_GEMINI_API_BASE,
    error::{AppError, AppResult},
    model::chat::Role,
};

const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<ContentPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum ContentPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    /// Anything else (function calls, thoughts); ignored.
    Other(serde_json::Value),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<&'static str>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
}

#[derive(Clone)]
pub struct GeminiProvider {
    client: Client,
    api_base: String,
}

impl GeminiProvider {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.into(),
        }
    }

    fn url(&self, model: &str, method: &str) -> String {
        format!("{}/{}:{method}", self.api_base, qualified_model(model))
    }

    fn build_request(request: &ProviderRequest) -> GeminiRequest {
        let contents = request
            .turns
            .iter()
            .map(|turn| GeminiContent {
                role: Some(
                    match turn.role {
                        Role::User => "user",
                        Role::Assistant => "model",
                    }
                    .to_string(),
                ),
                parts: vec![ContentPart::Text {
                    text: turn.text.clone(),
                }],
            })
            .collect();

        let system_instruction = request
            .system_instruction
            .as_ref()
            .filter(|s| !s.trim().is_empty())
            .map(|text| GeminiContent {
                role: None,
                parts: vec![ContentPart::Text { text: text.clone() }],
            });

        let generation_config = match request.modality {
            Modality::Text => None,
            Modality::TextAndImage => Some(GenerationConfig {
                response_modalities: vec!["TEXT", "IMAGE"],
            }),
        };

        GeminiRequest {
            contents,
            system_instruction,
            generation_config,
        }
    }

    /// Upstream message verbatim when the body carries one, raw body otherwise.
    fn map_api_error(status: u16, body: &str) -> AppError {
        let message = serde_json::from_str::<GeminiResponse>(body)
            .ok()
            .and_then(|r| r.error)
            .map(|e| e.message)
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| {
                if body.trim().is_empty() {
                    format!("Gemini API returned status {status}")
                } else {
                    body.trim().to_string()
                }
            });
        AppError::Provider(message)
    }

    fn collect_parts(response: GeminiResponse) -> AppResult<Vec<ProviderPart>> {
        if let Some(err) = response.error {
            return Err(AppError::Provider(err.message));
        }

        let parts = response
            .candidates
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.content)
            .map(|c| c.parts)
            .unwrap_or_default();

        Ok(parts
            .into_iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(ProviderPart::Text(text)),
                ContentPart::InlineData { inline_data } => Some(ProviderPart::InlineImage {
                    mime_type: inline_data.mime_type,
                    data: inline_data.data,
                }),
                ContentPart::Other(_) => None,
            })
            .collect())
    }

    fn stream_payload_text(payload: &str) -> Option<AppResult<String>> {
        match serde_json::from_str::<GeminiResponse>(payload) {
            Ok(response) => match Self::collect_parts(response) {
                Ok(parts) => {
                    let text: String = parts
                        .into_iter()
                        .filter_map(|p| match p {
                            ProviderPart::Text(t) => Some(t),
                            ProviderPart::InlineImage { .. } => None,
                        })
                        .collect();
                    if text.is_empty() {
                        None
                    } else {
                        Some(Ok(text))
                    }
                }
                Err(err) => Some(Err(err)),
            },
            Err(e) => {
                warn!(error = %e, "failed to parse Gemini stream chunk");
                None
            }
        }
    }
}

impl Default for GeminiProvider {
    fn default() -> Self {
        Self::new(DEFAULT_GEMINI_API_BASE)
    }
}

#[async_trait]
impl ModelProvider for GeminiProvider {
    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn generate(&self, request: &ProviderRequest) -> AppResult<Vec<ProviderPart>> {
        let url = self.url(&request.model, "generateContent");
        let body = Self::build_request(request);

        debug!(turns = request.turns.len(), "sending Gemini request");

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &request.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AppError::Provider(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            error!(status = %status, "Gemini API error");
            return Err(Self::map_api_error(status.as_u16(), &text));
        }

        let parsed: GeminiResponse = serde_json::from_str(&text).map_err(|e| {
            error!(error = %e, "failed to parse Gemini response");
            AppError::Provider(format!("Failed to parse Gemini response: {e}"))
        })?;

        Self::collect_parts(parsed)
    }

    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn stream(&self, request: &ProviderRequest) -> AppResult<TextStream> {
        let url = self.url(&request.model, "streamGenerateContent");
        let body = Self::build_request(request);

        debug!("opening Gemini stream");

        let response = self
            .client
            .post(&url)
            .query(&[("alt", "sse")])
            .header(API_KEY_HEADER, &request.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!(status = %status, "Gemini stream rejected");
            return Err(Self::map_api_error(status.as_u16(), &text));
        }

        let mut decoder = SseDecoder::new();
        let chunks = response
            .bytes_stream()
            .map(move |item| match item {
                Ok(bytes) => decoder
                    .push(&bytes)
                    .iter()
                    .filter_map(|payload| Self::stream_payload_text(payload))
                    .collect::<Vec<_>>(),
                Err(e) => vec![Err(AppError::Provider(format!("Stream error: {e}")))],
            })
            .flat_map(stream::iter);

        Ok(Box::pin(chunks))
    }
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}
