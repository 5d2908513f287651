use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::extract::State;
use axum::{response::IntoResponse, routing::get, Router};

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

use crate::config::AppConfig;
use crate::conversation::SessionRegistry;
use crate::inference::{GenerationClient, ModelProvider};
use crate::preview::{self, Debouncer, RenderError};
use crate::storage::ProjectStore;
use anyhow::anyhow;
use tracing::{debug, info, warn};

// ------------------------------------------------------------
// TYPES
// ------------------------------------------------------------
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub client: GenerationClient,
    pub sessions: SessionRegistry,
    pub projects: Arc<ProjectStore>,
}

impl AppState {
    pub fn new(config: AppConfig, provider: Arc<dyn ModelProvider>, projects: ProjectStore) -> Self {
        Self {
            config: Arc::new(config),
            client: GenerationClient::new(provider),
            sessions: SessionRegistry::new(),
            projects: Arc::new(projects),
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PreviewMsg {
    Code {
        #[serde(default)]
        code: String,
    },
    RenderError {
        message: String,
        #[serde(default)]
        stack: Option<String>,
    },
}

// ------------------------------------------------------------
// ROUTER
// ------------------------------------------------------------
pub fn ws_router() -> Router<AppState> {
    Router::new().route("/ws/preview", get(ws_handler))
}

async fn ws_handler(
    ws: axum::extract::WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

// ------------------------------------------------------------
// WEBSOCKET HANDLER (SPLIT SOCKET)
// ------------------------------------------------------------
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<WsMessage>(32);

    // Dedicated writer task keeps websocket flushing smoothly.
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match timeout(Duration::from_secs(5), ws_sender.send(msg)).await {
                Ok(Ok(_)) => {}
                Ok(Err(_)) => break,
                Err(_) => continue,
            }
        }
    });

    // Edits land in the debouncer; only the settled code is rendered.
    let (code_tx, mut code_rx) = mpsc::channel::<String>(4);
    let mut debouncer = Debouncer::new(state.config.preview_debounce, code_tx);

    let render_tx = tx.clone();
    let renderer = tokio::spawn(async move {
        while let Some(code) = code_rx.recv().await {
            let payload = match preview::render(&code) {
                Ok(doc) => {
                    let frame = preview::sandbox_frame(&doc);
                    serde_json::json!({
                        "type": "preview",
                        "kind": doc.kind,
                        "component": doc.component,
                        "document": doc.html,
                        "frame": frame,
                    })
                }
                Err(err) => json_error(&err.to_string()),
            };
            if send_json(&render_tx, payload).await.is_err() {
                break;
            }
        }
    });

    info!(
        debounce_ms = debouncer.delay().as_millis() as u64,
        "preview socket opened"
    );

    'socket_loop: while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            WsMessage::Text(raw) => {
                let parsed = match decode_inbound(raw.as_str()) {
                    Some(v) => v,
                    None => {
                        if let Err(err) = send_json(&tx, json_error("Invalid JSON")).await {
                            warn!(error = %err, "failed to send ws message");
                            break 'socket_loop;
                        }
                        continue;
                    }
                };

                match parsed {
                    PreviewMsg::Code { code } => {
                        debug!(code_len = code.len(), "preview edit scheduled");
                        debouncer.schedule(code);
                    }
                    PreviewMsg::RenderError { message, stack } => {
                        let report = RenderError { message, stack };
                        report.report("ws");
                        let echo = serde_json::json!({
                            "type": "render_error",
                            "message": report.message,
                            "stack": report.stack,
                        });
                        if let Err(err) = send_json(&tx, echo).await {
                            warn!(error = %err, "failed to send ws message");
                            break 'socket_loop;
                        }
                    }
                }
            }
            WsMessage::Close(_) => break 'socket_loop,
            _ => {}
        }
    }

    debouncer.cancel();
    drop(debouncer);
    renderer.abort();
    drop(tx);
    let _ = writer.await;
    info!("preview socket closed");
}

/// Frames forwarded verbatim from the sandbox (`preview-error`) are accepted
/// next to the socket's own tagged messages.
fn decode_inbound(raw: &str) -> Option<PreviewMsg> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    if let Some(RenderError { message, stack }) = RenderError::from_message(&value) {
        return Some(PreviewMsg::RenderError { message, stack });
    }
    serde_json::from_value(value).ok()
}

async fn send_json(
    sender: &mpsc::Sender<WsMessage>,
    value: serde_json::Value,
) -> anyhow::Result<()> {
    let msg = WsMessage::Text(value.to_string().into());

    match timeout(Duration::from_secs(2), sender.send(msg)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(_)) => Err(anyhow!("ws channel closed")),
        Err(_) => Ok(()),
    }
}

fn json_error(msg: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "error",
        "message": msg
    })
}
