use axum::{
    body::Body,
    extract::{Path, State},
    http::{
        header::{CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_TYPE},
        HeaderValue,
    },
    response::{IntoResponse, Response},
    Json,
};
use tracing::{info, warn};

use crate::{
    api::types::{
        ChatRouteRequest, CreateSessionRequest, DeletedResponse, GenerateResponse,
        ImageRouteRequest, ImageRouteResponse, ModelsResponse, PreviewRequest, PreviewResponse,
        SessionMessageRequest,
    },
    conversation::{resolve_system_prompt, ChatSession},
    error::{AppError, AppResult},
    inference::{
        client::{ChatCall, DesignRequest},
        StreamingGeneration, FALLBACK_TEXT_MODEL, IMAGE_ONLY_MODELS, TEXT_MODELS,
    },
    model::{
        agent::{Agent, AgentKind, ALL_AGENTS},
        chat::ChatMessage,
        generation::GenerationRequest,
        project::Project,
        settings::Settings,
    },
    preview,
    prompts::DEFAULT_STYLE,
    storage::{self, ProjectDraft},
    ws::AppState,
};

pub const MODEL_USED_HEADER: &str = "x-model-used";

// ------------------------------------------------------------
// GENERATION
// ------------------------------------------------------------
pub async fn generate(
    State(state): State<AppState>,
    Json(req): Json<GenerationRequest>,
) -> AppResult<Json<GenerateResponse>> {
    let result = state.client.generate_buffered(&req).await?;
    info!(
        model_used = result.model_used.as_str(),
        generation_type = req.generation_type.as_str(),
        code_len = result.extracted_code.len(),
        "generation completed"
    );
    Ok(Json(GenerateResponse::new(&req, result)))
}

pub async fn generate_stream(
    State(state): State<AppState>,
    Json(req): Json<GenerationRequest>,
) -> AppResult<Response> {
    match state.client.generate_streaming(&req).await {
        Ok(streaming) => Ok(text_stream_response(streaming)),
        Err(err @ AppError::Validation { .. }) => Err(err),
        Err(err) => {
            warn!(error = %err, "stream could not be opened; answering buffered");
            let result = state.client.generate_buffered(&req).await?;
            Ok(Json(GenerateResponse::new(&req, result)).into_response())
        }
    }
}

pub async fn generate_image(
    State(state): State<AppState>,
    Json(req): Json<ImageRouteRequest>,
) -> AppResult<Json<ImageRouteResponse>> {
    let style = req
        .style
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_STYLE)
        .to_string();

    let design = DesignRequest {
        api_key: req.api_key.clone(),
        prompt: req.prompt.clone(),
        style: style.clone(),
        model: req.model.clone(),
    };

    if req.wants_images() {
        let result = state.client.generate_images(&design).await?;
        return Ok(Json(ImageRouteResponse::Images {
            images: result.images.unwrap_or_default(),
            model_used: result.model_used,
        }));
    }

    let result = state.client.generate_design(&design).await?;
    Ok(Json(ImageRouteResponse::Design {
        design_spec: result.design_spec.unwrap_or_default(),
        code: result.extracted_code,
        model_used: result.model_used,
        style,
    }))
}

/// Stateless chat: the caller owns the transcript, the server owns the credential.
pub async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRouteRequest>,
) -> AppResult<Response> {
    if req.messages.is_empty() {
        return Err(AppError::missing("messages"));
    }
    let api_key = state
        .config
        .chat_api_key
        .as_deref()
        .ok_or_else(|| AppError::Config("GOOGLE_GENERATIVE_AI_API_KEY is not set".into()))?;

    let system_prompt =
        resolve_system_prompt(req.agent_id.as_deref(), req.system_prompt.as_deref());
    let streaming = state
        .client
        .chat_stream(ChatCall {
            api_key,
            model: &state.config.chat_model,
            system_prompt: &system_prompt,
            history: &req.messages,
        })
        .await?;

    Ok(text_stream_response(streaming))
}

fn text_stream_response(streaming: StreamingGeneration) -> Response {
    let model_used = streaming.model_used.clone();
    let mut response = Response::new(Body::from_stream(streaming.into_stream()));

    let headers = response.headers_mut();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    match HeaderValue::from_str(&model_used) {
        Ok(value) => {
            headers.insert(MODEL_USED_HEADER, value);
        }
        Err(_) => warn!(model_used = model_used.as_str(), "model id is not a valid header value"),
    }
    response
}

// ------------------------------------------------------------
// AGENTS / CHAT SESSIONS
// ------------------------------------------------------------
pub async fn list_agents() -> Json<Vec<Agent>> {
    Json(ALL_AGENTS.iter().map(|kind| kind.agent()).collect())
}

pub async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Json<ChatSession> {
    let agent = AgentKind::resolve(req.agent_id.as_deref());
    Json(state.sessions.create(agent).await)
}

pub async fn get_session(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> AppResult<Json<ChatSession>> {
    Ok(Json(state.sessions.snapshot(&session_id).await?))
}

/// Unknown ids answer `deleted: false`, same as projects.
pub async fn delete_session(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Json<DeletedResponse> {
    let deleted = state.sessions.remove(&session_id).await;
    Json(DeletedResponse {
        id: session_id,
        deleted,
    })
}

pub async fn post_session_message(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<SessionMessageRequest>,
) -> AppResult<Json<ChatMessage>> {
    let api_key = req
        .api_key
        .as_deref()
        .filter(|k| !k.trim().is_empty())
        .or(state.config.chat_api_key.as_deref())
        .unwrap_or_default();
    let model = req
        .model
        .as_deref()
        .filter(|m| !m.trim().is_empty())
        .unwrap_or(&state.config.chat_model);

    let reply = state
        .sessions
        .submit(&session_id, &state.client, api_key, model, &req.content)
        .await?;
    Ok(Json(reply))
}

// ------------------------------------------------------------
// PREVIEW
// ------------------------------------------------------------
pub async fn render_preview(Json(req): Json<PreviewRequest>) -> AppResult<Json<PreviewResponse>> {
    let doc = preview::render(&req.code)?;
    let frame = preview::sandbox_frame(&doc);
    Ok(Json(PreviewResponse::new(doc, frame)))
}

// ------------------------------------------------------------
// PROJECTS / SETTINGS
// ------------------------------------------------------------
pub async fn list_projects(State(state): State<AppState>) -> AppResult<Json<Vec<Project>>> {
    Ok(Json(state.projects.list().await?))
}

pub async fn create_project(
    State(state): State<AppState>,
    Json(draft): Json<ProjectDraft>,
) -> AppResult<Json<Project>> {
    Ok(Json(state.projects.save(draft).await?))
}

pub async fn get_project(
    Path(project_id): Path<String>,
    State(state): State<AppState>,
) -> AppResult<Json<Project>> {
    Ok(Json(state.projects.load(&project_id).await?))
}

pub async fn delete_project(
    Path(project_id): Path<String>,
    State(state): State<AppState>,
) -> AppResult<Json<DeletedResponse>> {
    let deleted = state.projects.delete(&project_id).await?;
    Ok(Json(DeletedResponse {
        id: project_id,
        deleted,
    }))
}

pub async fn export_project(
    Path(project_id): Path<String>,
    State(state): State<AppState>,
) -> AppResult<Response> {
    let project = state.projects.load(&project_id).await?;
    let out = storage::export(&project)?;

    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        out.filename.replace(['"', '\\'], "")
    ))
    .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    Ok((
        [
            (CONTENT_TYPE, HeaderValue::from_static("application/json")),
            (CONTENT_DISPOSITION, disposition),
        ],
        out.json,
    )
        .into_response())
}

pub async fn get_settings(State(state): State<AppState>) -> AppResult<Json<Settings>> {
    Ok(Json(state.projects.load_settings().await?))
}

pub async fn put_settings(
    State(state): State<AppState>,
    Json(settings): Json<Settings>,
) -> AppResult<Json<Settings>> {
    state.projects.save_settings(&settings).await?;
    Ok(Json(settings))
}

pub async fn list_models() -> Json<ModelsResponse> {
    Json(ModelsResponse {
        text: TEXT_MODELS,
        image: IMAGE_ONLY_MODELS,
        fallback: FALLBACK_TEXT_MODEL,
    })
}
