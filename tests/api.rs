use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use futures_util::stream;
use serde_json::{json, Value};
use tower::ServiceExt;

use v0forge::{
    config::AppConfig,
    error::{AppError, AppResult},
    inference::{ModelProvider, ProviderPart, ProviderRequest, TextStream, FALLBACK_TEXT_MODEL},
    storage::ProjectStore,
    ws::AppState,
};

/// Canned provider that records every request it sees.
#[derive(Default)]
struct ScriptedProvider {
    calls: Mutex<Vec<ProviderRequest>>,
    reply: Vec<ProviderPart>,
    chunks: Vec<String>,
    fail_with: Option<String>,
    refuse_stream: bool,
}

impl ScriptedProvider {
    fn replying(text: &str) -> Self {
        Self {
            reply: vec![ProviderPart::Text(text.to_string())],
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<ProviderRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    async fn generate(&self, request: &ProviderRequest) -> AppResult<Vec<ProviderPart>> {
        self.calls.lock().unwrap().push(request.clone());
        match &self.fail_with {
            Some(msg) => Err(AppError::Provider(msg.clone())),
            None => Ok(self.reply.clone()),
        }
    }

    async fn stream(&self, request: &ProviderRequest) -> AppResult<TextStream> {
        self.calls.lock().unwrap().push(request.clone());
        if self.refuse_stream {
            return Err(AppError::Provider("stream refused".into()));
        }
        let items: Vec<AppResult<String>> = self.chunks.iter().cloned().map(Ok).collect();
        Ok(Box::pin(stream::iter(items)))
    }
}

fn app_with(provider: Arc<ScriptedProvider>, config: AppConfig) -> Router {
    v0forge::app(AppState::new(config, provider, ProjectStore::in_memory()))
}

fn app(provider: Arc<ScriptedProvider>) -> Router {
    app_with(provider, AppConfig::ephemeral())
}

struct TestResponse {
    status: StatusCode,
    headers: axum::http::HeaderMap,
    body: Vec<u8>,
}

impl TestResponse {
    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    fn text(&self) -> String {
        String::from_utf8(self.body.clone()).unwrap()
    }
}

async fn send(app: Router, method: Method, uri: &str, body: Option<Value>) -> TestResponse {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let response = app.oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec();
    TestResponse {
        status,
        headers,
        body,
    }
}

#[tokio::test]
async fn missing_fields_are_rejected_before_the_provider() {
    let provider = Arc::new(ScriptedProvider::replying("unused"));

    for (body, field) in [
        (json!({"model": "m", "prompt": "p"}), "apiKey"),
        (json!({"apiKey": "k", "prompt": "p"}), "model"),
        (json!({"apiKey": "k", "model": "m", "prompt": "   "}), "prompt"),
    ] {
        for uri in ["/api/generate", "/api/generate/stream"] {
            let res = send(app(provider.clone()), Method::POST, uri, Some(body.clone())).await;
            assert_eq!(res.status, StatusCode::BAD_REQUEST);
            assert_eq!(res.json()["field"], field);
        }
    }
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn generate_returns_extracted_code() {
    let provider = Arc::new(ScriptedProvider::replying(
        "Here you go:\n```html\n<!DOCTYPE html><html><body>Hi</body></html>\n```",
    ));
    let res = send(
        app(provider.clone()),
        Method::POST,
        "/api/generate",
        Some(json!({
            "apiKey": "k",
            "model": "models/gemini-2.5-flash",
            "prompt": "landing page",
            "type": "page",
            "options": {"cssFramework": "bootstrap", "format": "single-html"}
        })),
    )
    .await;

    assert_eq!(res.status, StatusCode::OK);
    let body = res.json();
    assert_eq!(body["code"], "<!DOCTYPE html><html><body>Hi</body></html>");
    assert_eq!(body["model"], "models/gemini-2.5-flash");
    assert_eq!(body["type"], "page");

    let prompt = &provider.calls()[0].turns[0].text;
    assert!(prompt.contains("bootstrap"));
    assert!(prompt.ends_with("User Request:\nlanding page"));
}

#[tokio::test]
async fn provider_failure_is_a_bad_gateway_with_upstream_message() {
    let provider = Arc::new(ScriptedProvider {
        fail_with: Some("API key not valid. Please pass a valid API key.".into()),
        ..ScriptedProvider::default()
    });
    let res = send(
        app(provider),
        Method::POST,
        "/api/generate",
        Some(json!({"apiKey": "bad", "model": "m", "prompt": "p"})),
    )
    .await;
    assert_eq!(res.status, StatusCode::BAD_GATEWAY);
    assert_eq!(
        res.json()["error"],
        "API key not valid. Please pass a valid API key."
    );
}

#[tokio::test]
async fn stream_reports_substituted_model_and_strips_fences() {
    let provider = Arc::new(ScriptedProvider {
        chunks: vec!["``".into(), "`html\n<p>".into(), "ok</p>\n```".into()],
        ..ScriptedProvider::default()
    });
    let res = send(
        app(provider.clone()),
        Method::POST,
        "/api/generate/stream",
        Some(json!({
            "apiKey": "k",
            "model": "models/gemini-2.0-flash-preview-image-generation",
            "prompt": "p"
        })),
    )
    .await;

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.headers["x-model-used"], FALLBACK_TEXT_MODEL);
    assert!(res.headers[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    assert_eq!(res.text(), "html\n<p>ok</p>\n");
    assert_eq!(provider.calls()[0].model, FALLBACK_TEXT_MODEL);
}

#[tokio::test]
async fn stream_falls_back_to_buffered_json() {
    let provider = Arc::new(ScriptedProvider {
        reply: vec![ProviderPart::Text("```\n<b>x</b>\n```".into())],
        refuse_stream: true,
        ..ScriptedProvider::default()
    });
    let res = send(
        app(provider.clone()),
        Method::POST,
        "/api/generate/stream",
        Some(json!({"apiKey": "k", "model": "m", "prompt": "p"})),
    )
    .await;

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["code"], "<b>x</b>");
    assert_eq!(provider.calls().len(), 2);
}

#[tokio::test]
async fn design_branch_returns_spec_and_code() {
    let provider = Arc::new(ScriptedProvider::replying(
        "1. **Layout**: centered card\n```tsx\nexport default function Card() { return null }\n```",
    ));
    let res = send(
        app(provider),
        Method::POST,
        "/api/generate-image",
        Some(json!({"apiKey": "k", "prompt": "pricing card"})),
    )
    .await;

    assert_eq!(res.status, StatusCode::OK);
    let body = res.json();
    assert_eq!(body["designSpec"], "1. **Layout**: centered card");
    assert_eq!(body["code"], "export default function Card() { return null }");
    assert_eq!(body["style"], "modern");
    assert_eq!(body["modelUsed"], FALLBACK_TEXT_MODEL);
}

#[tokio::test]
async fn image_branch_requires_image_model() {
    let provider = Arc::new(ScriptedProvider::replying("unused"));
    let res = send(
        app(provider.clone()),
        Method::POST,
        "/api/generate-image",
        Some(json!({"apiKey": "k", "prompt": "cat", "output": "image", "model": "models/gemini-2.5-flash"})),
    )
    .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.json()["field"], "model");
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn chat_session_flow() {
    let provider = Arc::new(ScriptedProvider::replying("Rename `x` to `count`."));
    let app = app(provider.clone());

    let created = send(
        app.clone(),
        Method::POST,
        "/api/chat/sessions",
        Some(json!({"agentId": "code-reviewer"})),
    )
    .await
    .json();
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["agent"]["name"], "Code Reviewer");
    assert_eq!(created["messages"].as_array().unwrap().len(), 1);

    let reply = send(
        app.clone(),
        Method::POST,
        &format!("/api/chat/sessions/{id}/messages"),
        Some(json!({"content": "let x = 0;", "apiKey": "k"})),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json()["role"], "assistant");

    let transcript = send(app.clone(), Method::GET, &format!("/api/chat/sessions/{id}"), None)
        .await
        .json();
    let roles: Vec<&str> = transcript["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["role"].as_str().unwrap())
        .collect();
    assert_eq!(roles, vec!["assistant", "user", "assistant"]);
    assert_eq!(transcript["state"]["state"], "idle");

    let call = &provider.calls()[0];
    assert!(call
        .system_instruction
        .as_deref()
        .unwrap()
        .starts_with("You are an expert code reviewer"));

    let missing = send(app.clone(), Method::GET, "/api/chat/sessions/nope", None).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);

    let path = format!("/api/chat/sessions/{id}");
    let removed = send(app.clone(), Method::DELETE, &path, None).await;
    assert_eq!(removed.status, StatusCode::OK);
    assert_eq!(removed.json(), json!({"id": id, "deleted": true}));

    let gone = send(app.clone(), Method::GET, &path, None).await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
    let again = send(app, Method::DELETE, &path, None).await;
    assert_eq!(again.json()["deleted"], false);
}

#[tokio::test]
async fn stateless_chat_uses_server_credential() {
    let provider = Arc::new(ScriptedProvider {
        chunks: vec!["Hi there:\n``".into(), "`js\nx()\n```".into()],
        ..ScriptedProvider::default()
    });
    let messages = json!({"messages": [{"role": "user", "content": "hello"}]});

    let res = send(app(provider.clone()), Method::POST, "/api/chat", Some(messages.clone())).await;
    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(provider.calls().is_empty());

    let mut config = AppConfig::ephemeral();
    config.chat_api_key = Some("server-key".into());
    let res = send(
        app_with(provider.clone(), config),
        Method::POST,
        "/api/chat",
        Some(messages),
    )
    .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.text(), "Hi there:\n```js\nx()\n```");

    let call = &provider.calls()[0];
    assert_eq!(call.api_key, "server-key");
    assert_eq!(
        call.system_instruction.as_deref(),
        Some("You are a helpful AI assistant.")
    );
}

#[tokio::test]
async fn preview_route_wraps_fragments_in_a_sandbox() {
    let res = send(
        app(Arc::new(ScriptedProvider::default())),
        Method::POST,
        "/api/preview",
        Some(json!({"code": "export default function ExampleCard() { return <div/> }"})),
    )
    .await;
    assert_eq!(res.status, StatusCode::OK);
    let body = res.json();
    assert_eq!(body["kind"], "synthesized");
    assert_eq!(body["component"], "ExampleCard");
    assert!(body["frame"]
        .as_str()
        .unwrap()
        .starts_with(r#"<iframe title="Preview" sandbox="allow-scripts""#));
}

#[tokio::test]
async fn project_lifecycle() {
    let app = app(Arc::new(ScriptedProvider::default()));

    let rejected = send(
        app.clone(),
        Method::POST,
        "/api/projects",
        Some(json!({"name": "", "code": "<p/>"})),
    )
    .await;
    assert_eq!(rejected.status, StatusCode::BAD_REQUEST);

    let created = send(
        app.clone(),
        Method::POST,
        "/api/projects",
        Some(json!({"name": "Hero", "description": "top", "code": "<h1/>", "type": "page"})),
    )
    .await
    .json();
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["type"], "page");

    let list = send(app.clone(), Method::GET, "/api/projects", None).await.json();
    assert_eq!(list.as_array().unwrap().len(), 1);

    let export = send(app.clone(), Method::GET, &format!("/api/projects/{id}/export"), None).await;
    assert_eq!(
        export.headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"Hero.json\""
    );
    assert_eq!(export.json()["name"], "Hero");

    let unknown = send(app.clone(), Method::DELETE, "/api/projects/nope", None).await.json();
    assert_eq!(unknown["deleted"], false);

    let deleted = send(app.clone(), Method::DELETE, &format!("/api/projects/{id}"), None)
        .await
        .json();
    assert_eq!(deleted["deleted"], true);

    let gone = send(app, Method::GET, &format!("/api/projects/{id}"), None).await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn settings_and_catalogs() {
    let app = app(Arc::new(ScriptedProvider::default()));

    let empty = send(app.clone(), Method::GET, "/api/settings", None).await.json();
    assert_eq!(empty, json!({"apiKey": null, "model": null}));

    send(
        app.clone(),
        Method::PUT,
        "/api/settings",
        Some(json!({"apiKey": "k", "model": "models/gemini-2.5-pro"})),
    )
    .await;
    let saved = send(app.clone(), Method::GET, "/api/settings", None).await.json();
    assert_eq!(saved["model"], "models/gemini-2.5-pro");

    let agents = send(app.clone(), Method::GET, "/api/agents", None).await.json();
    assert_eq!(agents.as_array().unwrap().len(), 6);

    let models = send(app, Method::GET, "/api/models", None).await.json();
    assert_eq!(models["fallback"], FALLBACK_TEXT_MODEL);
}
