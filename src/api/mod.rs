use axum::{
    routing::{get, post},
    Router,
};

use crate::ws::AppState;

pub mod handlers;
pub mod types;

use handlers::{
    chat, create_project, create_session, delete_project, delete_session, export_project,
    generate, generate_image, generate_stream, get_project, get_session, get_settings,
    list_agents, list_models, list_projects, post_session_message, put_settings, render_preview,
};

/// Generation, chat and preview endpoints.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/api/generate", post(generate))
        .route("/api/generate/stream", post(generate_stream))
        .route("/api/generate-image", post(generate_image))
        .route("/api/chat", post(chat))
        .route("/api/agents", get(list_agents))
        .route("/api/chat/sessions", post(create_session))
        .route(
            "/api/chat/sessions/{session_id}",
            get(get_session).delete(delete_session),
        )
        .route(
            "/api/chat/sessions/{session_id}/messages",
            post(post_session_message),
        )
        .route("/api/preview", post(render_preview))
        .route("/api/models", get(list_models))
}

/// Saved projects and settings.
pub fn store_router() -> Router<AppState> {
    Router::new()
        .route("/api/projects", get(list_projects).post(create_project))
        .route(
            "/api/projects/{project_id}",
            get(get_project).delete(delete_project),
        )
        .route("/api/projects/{project_id}/export", get(export_project))
        .route("/api/settings", get(get_settings).put(put_settings))
}
