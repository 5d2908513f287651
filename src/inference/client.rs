use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine};
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use super::{
    fence::FenceStripper, is_image_only, text_model_for, Modality, ModelProvider, ProviderPart,
    ProviderRequest, ProviderTurn, FALLBACK_TEXT_MODEL,
};
use crate::{
    error::{AppError, AppResult},
    extract::{extract_code, extract_design},
    model::{
        chat::ChatMessage,
        generation::{GeneratedImage, GenerationRequest, GenerationResult, GenerationType},
    },
    prompts,
};

const STREAM_BUFFER: usize = 64;

/// How streamed chunks are handed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamText {
    /// Generated code: ``` markers removed, even when split across chunks.
    StripFences,
    Verbatim,
}

/// Input of the design/image route.
#[derive(Debug, Clone, Default)]
pub struct DesignRequest {
    pub api_key: String,
    pub prompt: String,
    pub style: String,
    pub model: Option<String>,
}

/// A chat turn: full transcript plus the persona prompt, kept separate.
#[derive(Clone, Copy)]
pub struct ChatCall<'a> {
    pub api_key: &'a str,
    pub model: &'a str,
    pub system_prompt: &'a str,
    pub history: &'a [ChatMessage],
}

/// An opened stream. Dropping `chunks` stops the pump and closes the upstream transport.
pub struct StreamingGeneration {
    pub model_used: String,
    pub chunks: mpsc::Receiver<AppResult<String>>,
}

impl StreamingGeneration {
    pub fn into_stream(self) -> ReceiverStream<AppResult<String>> {
        ReceiverStream::new(self.chunks)
    }

    /// Drains the stream; the first error aborts with whatever was gathered discarded.
    pub async fn collect(mut self) -> AppResult<String> {
        let mut out = String::new();
        while let Some(chunk) = self.chunks.recv().await {
            out.push_str(&chunk?);
        }
        Ok(out)
    }
}

#[derive(Clone)]
pub struct GenerationClient {
    provider: Arc<dyn ModelProvider>,
}

impl GenerationClient {
    pub fn new(provider: Arc<dyn ModelProvider>) -> Self {
        Self { provider }
    }

    /// Required fields, checked before anything touches the network.
    pub fn validate(request: &GenerationRequest) -> AppResult<()> {
        require("apiKey", &request.api_key)?;
        require("model", &request.model)?;
        require("prompt", &request.prompt)?;
        Ok(())
    }

    fn text_call(request: &GenerationRequest) -> AppResult<ProviderRequest> {
        Self::validate(request)?;
        let model_used = text_model_for(&request.model);
        if model_used != request.model.trim() {
            info!(
                requested = request.model.as_str(),
                model_used = model_used.as_str(),
                "image-only model swapped for text generation"
            );
        }
        let prompt =
            prompts::build_prompt(request.generation_type, &request.options(), &request.prompt)?;
        Ok(ProviderRequest::single_prompt(
            &request.api_key,
            &model_used,
            prompt,
        ))
    }

    pub async fn generate_buffered(&self, request: &GenerationRequest) -> AppResult<GenerationResult> {
        let call = Self::text_call(request)?;
        let parts = self.provider.generate(&call).await?;
        let raw_text = join_text(&parts);

        debug!(
            model_used = call.model.as_str(),
            chars = raw_text.len(),
            "buffered generation finished"
        );

        let (extracted_code, design_spec) = match request.generation_type {
            GenerationType::DesignSpec => {
                let out = extract_design(&raw_text);
                (out.code, out.design_spec)
            }
            _ => (extract_code(&raw_text), None),
        };

        Ok(GenerationResult {
            raw_text,
            extracted_code,
            model_used: call.model,
            design_spec,
            images: None,
        })
    }

    /// Fails when the streaming transport cannot be opened; callers fall back to
    /// [`generate_buffered`](Self::generate_buffered).
    pub async fn generate_streaming(
        &self,
        request: &GenerationRequest,
    ) -> AppResult<StreamingGeneration> {
        let call = Self::text_call(request)?;
        self.open_stream(call, StreamText::StripFences).await
    }

    pub async fn generate_design(&self, request: &DesignRequest) -> AppResult<GenerationResult> {
        require("apiKey", &request.api_key)?;
        require("prompt", &request.prompt)?;

        let model_used = request
            .model
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .map(text_model_for)
            .unwrap_or_else(|| FALLBACK_TEXT_MODEL.to_string());
        let prompt = prompts::build_design_prompt(&request.style, &request.prompt)?;
        let call = ProviderRequest::single_prompt(&request.api_key, &model_used, prompt);

        let parts = self.provider.generate(&call).await?;
        let raw_text = join_text(&parts);
        let out = extract_design(&raw_text);

        Ok(GenerationResult {
            raw_text,
            extracted_code: out.code,
            model_used,
            design_spec: out.design_spec,
            images: None,
        })
    }

    pub async fn generate_images(&self, request: &DesignRequest) -> AppResult<GenerationResult> {
        require("apiKey", &request.api_key)?;
        require("prompt", &request.prompt)?;
        let model = request.model.as_deref().unwrap_or_default();
        require("model", model)?;
        if !is_image_only(model) {
            return Err(AppError::invalid(
                "model",
                format!("Model `{}` cannot produce images", model.trim()),
            ));
        }

        let prompt = prompts::build_image_prompt(&request.style, &request.prompt)?;
        let mut call = ProviderRequest::single_prompt(&request.api_key, model.trim(), prompt);
        call.modality = Modality::TextAndImage;

        let parts = self.provider.generate(&call).await?;
        let raw_text = join_text(&parts);
        let images: Vec<GeneratedImage> = parts
            .iter()
            .filter_map(|part| match part {
                ProviderPart::InlineImage { mime_type, data } => decode_image(mime_type, data),
                ProviderPart::Text(_) => None,
            })
            .collect();

        if images.is_empty() {
            return Err(AppError::NoContent(
                "The model returned no images".to_string(),
            ));
        }

        info!(count = images.len(), model = call.model.as_str(), "images generated");

        Ok(GenerationResult {
            extracted_code: String::new(),
            raw_text,
            model_used: call.model,
            design_spec: None,
            images: Some(images),
        })
    }

    pub async fn chat(&self, call: ChatCall<'_>) -> AppResult<String> {
        let request = Self::chat_request(&call)?;
        let parts = self.provider.generate(&request).await?;
        Ok(join_text(&parts))
    }

    /// Assistant text is relayed as written; markdown fences are part of the reply.
    pub async fn chat_stream(&self, call: ChatCall<'_>) -> AppResult<StreamingGeneration> {
        let request = Self::chat_request(&call)?;
        self.open_stream(request, StreamText::Verbatim).await
    }

    fn chat_request(call: &ChatCall<'_>) -> AppResult<ProviderRequest> {
        require("apiKey", call.api_key)?;
        require("model", call.model)?;
        if call.history.is_empty() {
            return Err(AppError::missing("messages"));
        }

        let turns = call
            .history
            .iter()
            .map(|msg| ProviderTurn {
                role: msg.role,
                text: msg.content.clone(),
            })
            .collect();

        Ok(ProviderRequest {
            api_key: call.api_key.to_string(),
            model: text_model_for(call.model),
            system_instruction: Some(call.system_prompt.to_string()),
            turns,
            modality: Modality::Text,
        })
    }

    async fn open_stream(
        &self,
        call: ProviderRequest,
        text: StreamText,
    ) -> AppResult<StreamingGeneration> {
        let mut upstream = self.provider.stream(&call).await?;
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let model_used = call.model.clone();

        tokio::spawn(async move {
            let mut stripper = FenceStripper::new();
            while let Some(item) = upstream.next().await {
                let ready = match item {
                    Ok(chunk) if text == StreamText::Verbatim => Ok(chunk),
                    Ok(chunk) => match stripper.push(&chunk) {
                        Some(ready) => Ok(ready),
                        None => continue,
                    },
                    Err(err) => Err(err),
                };
                let failed = ready.is_err();
                if tx.send(ready).await.is_err() {
                    debug!("stream consumer went away; closing upstream");
                    return;
                }
                if failed {
                    return;
                }
            }
            if let Some(rest) = stripper.flush() {
                if tx.send(Ok(rest)).await.is_err() {
                    warn!("stream consumer dropped before final flush");
                }
            }
        });

        Ok(StreamingGeneration {
            model_used,
            chunks: rx,
        })
    }
}

fn require(field: &'static str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        Err(AppError::missing(field))
    } else {
        Ok(())
    }
}

fn join_text(parts: &[ProviderPart]) -> String {
    parts
        .iter()
        .filter_map(|p| match p {
            ProviderPart::Text(t) => Some(t.as_str()),
            ProviderPart::InlineImage { .. } => None,
        })
        .collect()
}

/// Providers may wrap long base64 payloads across lines.
fn decode_image(mime_type: &str, data: &str) -> Option<GeneratedImage> {
    let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    match STANDARD.decode(compact) {
        Ok(bytes) if !bytes.is_empty() => Some(GeneratedImage {
            mime_type: mime_type.to_string(),
            data_url: format!("data:{mime_type};base64,{}", STANDARD.encode(bytes)),
        }),
        Ok(_) => None,
        Err(e) => {
            warn!(error = %e, mime_type, "dropping undecodable image part");
            None
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use futures_util::stream;

    use super::*;
    use crate::inference::TextStream;

    /// Records every call and replays canned output.
    #[derive(Default)]
    pub struct FakeProvider {
        pub calls: Mutex<Vec<ProviderRequest>>,
        pub parts: Mutex<Vec<ProviderPart>>,
        pub chunks: Mutex<Vec<String>>,
        pub fail_with: Mutex<Option<String>>,
        pub refuse_stream: bool,
        /// `generate` records the call and then never answers.
        pub stall: bool,
    }

    impl FakeProvider {
        pub fn with_text(text: &str) -> Self {
            let fake = Self::default();
            *fake.parts.lock().unwrap() = vec![ProviderPart::Text(text.to_string())];
            fake
        }

        pub fn with_chunks(chunks: &[&str]) -> Self {
            let fake = Self::default();
            *fake.chunks.lock().unwrap() = chunks.iter().map(|c| c.to_string()).collect();
            fake
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub fn last_call(&self) -> Option<ProviderRequest> {
            self.calls.lock().unwrap().last().cloned()
        }
    }

    #[async_trait]
    impl ModelProvider for FakeProvider {
        async fn generate(&self, request: &ProviderRequest) -> AppResult<Vec<ProviderPart>> {
            self.calls.lock().unwrap().push(request.clone());
            if self.stall {
                std::future::pending::<()>().await;
            }
            if let Some(msg) = self.fail_with.lock().unwrap().clone() {
                return Err(AppError::Provider(msg));
            }
            Ok(self.parts.lock().unwrap().clone())
        }

        async fn stream(&self, request: &ProviderRequest) -> AppResult<TextStream> {
            self.calls.lock().unwrap().push(request.clone());
            if self.refuse_stream {
                return Err(AppError::Provider("streaming unavailable".into()));
            }
            let chunks: Vec<AppResult<String>> =
                self.chunks.lock().unwrap().iter().cloned().map(Ok).collect();
            Ok(Box::pin(stream::iter(chunks)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeProvider;
    use super::*;
    use crate::model::chat::Role;

    fn request(api_key: &str, model: &str, prompt: &str) -> GenerationRequest {
        GenerationRequest {
            api_key: api_key.into(),
            model: model.into(),
            prompt: prompt.into(),
            ..GenerationRequest::default()
        }
    }

    #[tokio::test]
    async fn invalid_input_never_reaches_the_provider() {
        let fake = Arc::new(FakeProvider::with_text("unused"));
        let client = GenerationClient::new(fake.clone());

        for (key, model, prompt, field) in [
            ("", "m", "p", "apiKey"),
            ("k", "  ", "p", "model"),
            ("k", "m", "", "prompt"),
        ] {
            let err = client
                .generate_buffered(&request(key, model, prompt))
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::Validation { field: f, .. } if f == field));
            assert!(client
                .generate_streaming(&request(key, model, prompt))
                .await
                .is_err());
        }
        assert_eq!(fake.call_count(), 0);
    }

    #[tokio::test]
    async fn buffered_extracts_fenced_code() {
        let fake = Arc::new(FakeProvider::with_text(
            "Sure!\n```html\n<!DOCTYPE html><html></html>\n```\nBye",
        ));
        let client = GenerationClient::new(fake.clone());
        let out = client
            .generate_buffered(&request("k", "models/gemini-2.5-flash", "landing"))
            .await
            .unwrap();
        assert_eq!(out.extracted_code, "<!DOCTYPE html><html></html>");
        assert!(out.raw_text.starts_with("Sure!"));
        assert_eq!(out.model_used, "models/gemini-2.5-flash");

        let call = fake.last_call().unwrap();
        assert_eq!(call.api_key, "k");
        assert!(call.turns[0].text.ends_with("User Request:\nlanding"));
    }

    #[tokio::test]
    async fn image_only_model_is_reported_as_substituted() {
        let fake = Arc::new(FakeProvider::with_text("<p>x</p>"));
        let client = GenerationClient::new(fake.clone());
        let out = client
            .generate_buffered(&request(
                "k",
                "models/gemini-2.5-flash-image-preview",
                "p",
            ))
            .await
            .unwrap();
        assert_eq!(out.model_used, FALLBACK_TEXT_MODEL);
        assert_eq!(fake.last_call().unwrap().model, FALLBACK_TEXT_MODEL);
    }

    #[tokio::test]
    async fn provider_error_is_passed_through() {
        let fake = Arc::new(FakeProvider::default());
        *fake.fail_with.lock().unwrap() = Some("quota exhausted".into());
        let client = GenerationClient::new(fake);
        let err = client
            .generate_buffered(&request("k", "m", "p"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "quota exhausted");
    }

    #[tokio::test]
    async fn streamed_chunks_arrive_in_order_without_fences() {
        let chunks = ["```ht", "ml\n<div>", "hi</div>\n`", "``"];
        let fake = Arc::new(FakeProvider::with_chunks(&chunks));
        let client = GenerationClient::new(fake);
        let streaming = client
            .generate_streaming(&request("k", "m", "p"))
            .await
            .unwrap();
        assert_eq!(streaming.model_used, "m");
        let text = streaming.collect().await.unwrap();
        assert_eq!(text, chunks.concat().replace("```", ""));
    }

    #[tokio::test]
    async fn chat_stream_keeps_markdown_fences() {
        let chunks = ["Try:\n``", "`rust\nfn a() {}\n```"];
        let fake = Arc::new(FakeProvider::with_chunks(&chunks));
        let client = GenerationClient::new(fake);
        let history = vec![ChatMessage::user("how do I write a function?")];
        let streaming = client
            .chat_stream(ChatCall {
                api_key: "k",
                model: "gemini-1.5-flash",
                system_prompt: "You are an expert code reviewer.",
                history: &history,
            })
            .await
            .unwrap();
        let text = streaming.collect().await.unwrap();
        assert_eq!(text, "Try:\n```rust\nfn a() {}\n```");
    }

    #[tokio::test]
    async fn dropping_the_receiver_is_harmless() {
        let many: Vec<String> = (0..500).map(|i| format!("chunk{i} ")).collect();
        let refs: Vec<&str> = many.iter().map(String::as_str).collect();
        let fake = Arc::new(FakeProvider::with_chunks(&refs));
        let client = GenerationClient::new(fake);
        let mut streaming = client
            .generate_streaming(&request("k", "m", "p"))
            .await
            .unwrap();
        let first = streaming.chunks.recv().await.unwrap().unwrap();
        assert_eq!(first, "chunk0 ");
        drop(streaming);
        tokio::task::yield_now().await;
    }

    #[tokio::test]
    async fn images_require_image_model_and_content() {
        let fake = Arc::new(FakeProvider::with_text("no pictures today"));
        let client = GenerationClient::new(fake.clone());
        let mut req = DesignRequest {
            api_key: "k".into(),
            prompt: "a cat".into(),
            style: "modern".into(),
            model: Some("models/gemini-2.5-flash".into()),
        };
        assert!(matches!(
            client.generate_images(&req).await,
            Err(AppError::Validation { field: "model", .. })
        ));
        assert_eq!(fake.call_count(), 0);

        req.model = Some("models/gemini-2.5-flash-image-preview".into());
        assert!(matches!(
            client.generate_images(&req).await,
            Err(AppError::NoContent(_))
        ));

        *fake.parts.lock().unwrap() = vec![
            ProviderPart::Text("here".into()),
            ProviderPart::InlineImage {
                mime_type: "image/png".into(),
                data: "iVBORw0KGgo=".into(),
            },
            ProviderPart::InlineImage {
                mime_type: "image/jpeg".into(),
                data: "/9j/4AAQ".into(),
            },
        ];
        let out = client.generate_images(&req).await.unwrap();
        let images = out.images.unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].data_url, "data:image/png;base64,iVBORw0KGgo=");
        assert_eq!(images[1].mime_type, "image/jpeg");
        assert_eq!(
            fake.last_call().unwrap().modality,
            Modality::TextAndImage
        );
    }

    #[test]
    fn wrapped_base64_payload_still_decodes() {
        let image = decode_image("image/png", "iVBO\nRw0K\r\n Ggo=\n").unwrap();
        assert_eq!(image.data_url, "data:image/png;base64,iVBORw0KGgo=");
        assert!(decode_image("image/png", "not base64!").is_none());
        assert!(decode_image("image/png", " \n").is_none());
    }

    #[tokio::test]
    async fn design_mode_returns_prose_and_code() {
        let fake = Arc::new(FakeProvider::with_text(
            "**Layout**: hero\n```tsx\nfunction Hero() { return null }\n```",
        ));
        let client = GenerationClient::new(fake);
        let out = client
            .generate_design(&DesignRequest {
                api_key: "k".into(),
                prompt: "hero".into(),
                style: String::new(),
                model: None,
            })
            .await
            .unwrap();
        assert_eq!(out.design_spec.as_deref(), Some("**Layout**: hero"));
        assert_eq!(out.extracted_code, "function Hero() { return null }");
        assert_eq!(out.model_used, FALLBACK_TEXT_MODEL);
    }

    #[tokio::test]
    async fn chat_keeps_system_prompt_out_of_messages() {
        let fake = Arc::new(FakeProvider::with_text("looks fine"));
        let client = GenerationClient::new(fake.clone());
        let history = vec![
            ChatMessage::assistant("Hello!"),
            ChatMessage::user("review this snippet"),
        ];
        let reply = client
            .chat(ChatCall {
                api_key: "k",
                model: "gemini-1.5-flash",
                system_prompt: "You are an expert code reviewer.",
                history: &history,
            })
            .await
            .unwrap();
        assert_eq!(reply, "looks fine");

        let call = fake.last_call().unwrap();
        assert_eq!(
            call.system_instruction.as_deref(),
            Some("You are an expert code reviewer.")
        );
        assert_eq!(call.turns.len(), 2);
        assert_eq!(call.turns[1].role, Role::User);
        assert!(call
            .turns
            .iter()
            .all(|t| !t.text.contains("expert code reviewer")));
    }
}
