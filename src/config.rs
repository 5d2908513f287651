use std::{path::PathBuf, time::Duration};

use anyhow::{anyhow, Result};

pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_CHAT_MODEL: &str = "gemini-1.5-flash";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_DEBOUNCE_MS: u64 = 500;
const DEFAULT_SESSION_IDLE_SECS: u64 = 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    RocksDb,
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    /// Server-side credential, only used by the chat route.
    pub chat_api_key: Option<String>,
    pub chat_model: String,
    pub gemini_api_base: String,
    pub storage: StorageBackend,
    pub data_dir: PathBuf,
    pub preview_debounce: Duration,
    /// Chat sessions untouched for this long are dropped.
    pub session_idle_ttl: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr = dotenvy::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
        let chat_api_key = dotenvy::var("GOOGLE_GENERATIVE_AI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());
        let chat_model =
            dotenvy::var("CHAT_MODEL").unwrap_or_else(|_| DEFAULT_CHAT_MODEL.to_string());
        let gemini_api_base = dotenvy::var("GEMINI_API_BASE")
            .unwrap_or_else(|_| DEFAULT_GEMINI_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();

        let storage = match dotenvy::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "rocksdb".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "memory" => StorageBackend::Memory,
            "rocksdb" => StorageBackend::RocksDb,
            other => return Err(anyhow!("unknown STORAGE_BACKEND `{other}`")),
        };

        let data_dir = dotenvy::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_data_dir());

        let debounce_ms = match dotenvy::var("PREVIEW_DEBOUNCE_MS") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|e| anyhow!("PREVIEW_DEBOUNCE_MS must be an integer: {e}"))?,
            Err(_) => DEFAULT_DEBOUNCE_MS,
        };

        let session_idle_secs = match dotenvy::var("SESSION_IDLE_TTL_SECS") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or_else(|| anyhow!("SESSION_IDLE_TTL_SECS must be a positive integer"))?,
            Err(_) => DEFAULT_SESSION_IDLE_SECS,
        };

        Ok(Self {
            bind_addr,
            chat_api_key,
            chat_model,
            gemini_api_base,
            storage,
            data_dir,
            preview_debounce: Duration::from_millis(debounce_ms),
            session_idle_ttl: Duration::from_secs(session_idle_secs),
        })
    }

    /// Config for tests and embedded use: memory storage, no server credential.
    pub fn ephemeral() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            chat_api_key: None,
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            gemini_api_base: DEFAULT_GEMINI_API_BASE.to_string(),
            storage: StorageBackend::Memory,
            data_dir: default_data_dir(),
            preview_debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            session_idle_ttl: Duration::from_secs(DEFAULT_SESSION_IDLE_SECS),
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field(
                "chat_api_key",
                &self.chat_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("chat_model", &self.chat_model)
            .field("gemini_api_base", &self.gemini_api_base)
            .field("storage", &self.storage)
            .field("data_dir", &self.data_dir)
            .field("preview_debounce", &self.preview_debounce)
            .field("session_idle_ttl", &self.session_idle_ttl)
            .finish()
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("v0forge")
        .join("store")
}
