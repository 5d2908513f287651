use std::{collections::HashMap, sync::Arc, time::Duration};

use serde::Serialize;
use tokio::{sync::Mutex, task::JoinHandle, time::Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    inference::client::{ChatCall, GenerationClient},
    model::{
        agent::{Agent, AgentKind},
        chat::ChatMessage,
        panel::PanelState,
    },
};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";

/// Persona-scoped transcript.
///
/// The recorded sequence, greeting included, is what gets replayed to the
/// provider on every turn; nothing is added or skipped on the way out.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: String,
    #[serde(serialize_with = "serialize_agent")]
    pub agent: AgentKind,
    messages: Vec<ChatMessage>,
    state: PanelState,
}

/// Snapshot handed to the provider while the session waits.
#[derive(Debug, Clone)]
pub struct PendingTurn {
    pub history: Vec<ChatMessage>,
    pub system_prompt: &'static str,
}

impl ChatSession {
    pub fn start(agent: AgentKind) -> Self {
        let persona = agent.agent();
        Self {
            id: Uuid::new_v4().to_string(),
            agent,
            messages: vec![ChatMessage::assistant(persona.welcome_text())],
            state: PanelState::Idle,
        }
    }

    pub fn persona(&self) -> Agent {
        self.agent.agent()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn state(&self) -> &PanelState {
        &self.state
    }

    /// Records the user message and moves to the waiting state.
    pub fn begin_turn(&mut self, content: &str, streaming: bool) -> AppResult<PendingTurn> {
        if content.trim().is_empty() {
            return Err(AppError::missing("content"));
        }
        if !self.state.begin(streaming) {
            return Err(AppError::SessionBusy);
        }

        self.messages.push(ChatMessage::user(content));
        Ok(PendingTurn {
            history: self.messages.clone(),
            system_prompt: self.persona().system_prompt,
        })
    }

    /// Resolves the waiting state; a failure becomes a readable assistant message.
    pub fn complete_turn(&mut self, outcome: AppResult<String>) -> &ChatMessage {
        match outcome {
            Ok(reply) => {
                self.messages.push(ChatMessage::assistant(reply));
                self.state.finish();
            }
            Err(err) => {
                warn!(session_id = self.id.as_str(), error = %err, "chat turn failed");
                let text = format!("Sorry, I couldn't respond: {err}");
                self.messages.push(ChatMessage::assistant(text));
                self.state.fail(err.to_string());
            }
        }
        &self.messages[self.messages.len() - 1]
    }

    /// Fails a turn nobody is waiting for anymore. No-op unless a turn is open.
    pub fn abandon_turn(&mut self) {
        if self.state.is_busy() {
            self.complete_turn(Err(AppError::Provider("request cancelled".into())));
        }
    }

    /// Single-owner convenience: the `&mut` borrow keeps one call in flight.
    pub async fn submit(
        &mut self,
        client: &GenerationClient,
        api_key: &str,
        model: &str,
        content: &str,
    ) -> AppResult<&ChatMessage> {
        require_credentials(api_key, model)?;
        let pending = self.begin_turn(content, false)?;
        let outcome = client
            .chat(ChatCall {
                api_key,
                model,
                system_prompt: pending.system_prompt,
                history: &pending.history,
            })
            .await;
        Ok(self.complete_turn(outcome))
    }
}

/// Checked before the turn is recorded so a bad request leaves no trace.
fn require_credentials(api_key: &str, model: &str) -> AppResult<()> {
    if api_key.trim().is_empty() {
        return Err(AppError::missing("apiKey"));
    }
    if model.trim().is_empty() {
        return Err(AppError::missing("model"));
    }
    Ok(())
}

fn serialize_agent<S: serde::Serializer>(kind: &AgentKind, s: S) -> Result<S::Ok, S::Error> {
    kind.agent().serialize(s)
}

/// System prompt for the stateless chat route.
pub fn resolve_system_prompt(agent_id: Option<&str>, system_prompt: Option<&str>) -> String {
    if let Some(explicit) = system_prompt.map(str::trim).filter(|s| !s.is_empty()) {
        return explicit.to_string();
    }
    agent_id
        .and_then(AgentKind::find)
        .map(|kind| kind.agent().system_prompt.to_string())
        .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string())
}

/// Server-held chat sessions, dropped once idle for longer than the sweep TTL.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<String, SessionEntry>>>,
}

struct SessionEntry {
    session: Arc<Mutex<ChatSession>>,
    last_active: Instant,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, agent: AgentKind) -> ChatSession {
        let session = ChatSession::start(agent);
        info!(
            session_id = session.id.as_str(),
            agent = agent.agent().id,
            "chat session started"
        );
        self.sessions.lock().await.insert(
            session.id.clone(),
            SessionEntry {
                session: Arc::new(Mutex::new(session.clone())),
                last_active: Instant::now(),
            },
        );
        session
    }

    /// Looks a session up and marks it active.
    pub async fn get(&self, id: &str) -> AppResult<Arc<Mutex<ChatSession>>> {
        let mut sessions = self.sessions.lock().await;
        let entry = sessions
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("chat session {id}")))?;
        entry.last_active = Instant::now();
        Ok(entry.session.clone())
    }

    pub async fn snapshot(&self, id: &str) -> AppResult<ChatSession> {
        let session = self.get(id).await?;
        let guard = session.lock().await;
        Ok(guard.clone())
    }

    /// A turn still in flight resolves against the detached session and is discarded.
    pub async fn remove(&self, id: &str) -> bool {
        let removed = self.sessions.lock().await.remove(id).is_some();
        if removed {
            info!(session_id = id, "chat session removed");
        }
        removed
    }

    /// Drops sessions idle for at least `idle`. Sessions with a turn in flight stay.
    pub async fn sweep(&self, idle: Duration) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, entry| {
            if entry.last_active.elapsed() < idle {
                return true;
            }
            match entry.session.try_lock() {
                Ok(session) => session.state().is_busy(),
                Err(_) => true,
            }
        });
        let swept = before - sessions.len();
        if swept > 0 {
            info!(swept, remaining = sessions.len(), "idle chat sessions dropped");
        }
        swept
    }

    /// Background sweep, a few times per TTL.
    pub fn spawn_sweeper(&self, idle: Duration) -> JoinHandle<()> {
        let registry = self.clone();
        let period = (idle / 4).max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                registry.sweep(idle).await;
            }
        })
    }

    /// Runs one turn. The session lock is released while the provider works,
    /// so a concurrent submit observes the waiting state and is rejected.
    pub async fn submit(
        &self,
        id: &str,
        client: &GenerationClient,
        api_key: &str,
        model: &str,
        content: &str,
    ) -> AppResult<ChatMessage> {
        let session = self.get(id).await?;
        require_credentials(api_key, model)?;
        let pending = session.lock().await.begin_turn(content, false)?;
        let open_turn = OpenTurn::new(session.clone());

        let outcome = client
            .chat(ChatCall {
                api_key,
                model,
                system_prompt: pending.system_prompt,
                history: &pending.history,
            })
            .await;

        let mut guard = session.lock().await;
        open_turn.close();
        Ok(guard.complete_turn(outcome).clone())
    }
}

/// Held across the provider call; if the caller goes away first, the turn is
/// failed on drop so the session does not stay busy.
struct OpenTurn {
    session: Option<Arc<Mutex<ChatSession>>>,
}

impl OpenTurn {
    fn new(session: Arc<Mutex<ChatSession>>) -> Self {
        Self {
            session: Some(session),
        }
    }

    fn close(mut self) {
        self.session = None;
    }
}

impl Drop for OpenTurn {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        debug!("chat turn dropped before the provider answered");
        if let Ok(mut locked) = session.try_lock() {
            locked.abandon_turn();
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    session.lock().await.abandon_turn();
                });
            }
            Err(_) => warn!("no runtime to release an abandoned chat turn"),
        }
    }
}
