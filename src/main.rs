use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use v0forge::{
    config::AppConfig, inference::GeminiProvider, storage::ProjectStore, ws::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------
    // Config / Logging
    // -----------------------------
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    info!(?config, "starting v0forge");

    // -----------------------------
    // Shared state / Dependencies
    // -----------------------------
    let projects = ProjectStore::from_config(&config)?;
    let provider = Arc::new(GeminiProvider::new(config.gemini_api_base.clone()));
    if config.chat_api_key.is_none() {
        info!("GOOGLE_GENERATIVE_AI_API_KEY not set; /api/chat will refuse requests");
    }

    let addr = config.bind_addr.clone();
    let state = AppState::new(config, provider, projects);
    let _sweeper = state.sessions.spawn_sweeper(state.config.session_idle_ttl);
    let app = v0forge::app(state);

    info!("HTTP listening on http://{addr}");
    info!("Preview socket at ws://{addr}/ws/preview");

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
