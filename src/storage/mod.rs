pub mod kv;

use std::sync::Arc;

use chrono::Utc;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    config::{AppConfig, StorageBackend},
    error::{AppError, AppResult},
    model::{
        project::{default_project_type, Project},
        settings::Settings,
    },
};

pub use kv::{KeyValueStore, MemoryStore, RocksStore};

pub const PROJECTS_KEY: &str = "v0-projects";
pub const SETTINGS_KEY: &str = "v0-settings";

/// Input of [`ProjectStore::save`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDraft {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub code: String,
    #[serde(rename = "type", default)]
    pub project_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectExport {
    pub filename: String,
    pub json: String,
}

/// Project collection and settings on top of a [`KeyValueStore`].
///
/// The collection lives under one key and is rewritten in full on every
/// mutation; `write_lock` makes each read-modify-write atomic. Records are
/// carried as raw JSON so an entry that does not parse is hidden from reads
/// but survives rewrites.
pub struct ProjectStore {
    kv: Arc<dyn KeyValueStore>,
    write_lock: Mutex<()>,
}

impl ProjectStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            write_lock: Mutex::new(()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let kv: Arc<dyn KeyValueStore> = match config.storage {
            StorageBackend::Memory => Arc::new(MemoryStore::new()),
            StorageBackend::RocksDb => Arc::new(RocksStore::open(&config.data_dir)?),
        };
        Ok(Self::new(kv))
    }

    pub async fn save(&self, draft: ProjectDraft) -> AppResult<Project> {
        if draft.name.trim().is_empty() {
            return Err(AppError::missing("name"));
        }
        if draft.code.trim().is_empty() {
            return Err(AppError::missing("code"));
        }

        let now = Utc::now();
        let project = Project {
            id: Uuid::new_v4().to_string(),
            name: draft.name.trim().to_string(),
            description: draft.description,
            code: draft.code,
            project_type: draft
                .project_type
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(default_project_type),
            created_at: now,
            updated_at: now,
        };

        let record = serde_json::to_value(&project)
            .map_err(|e| AppError::Storage(format!("failed to encode project: {e}")))?;

        let _guard = self.write_lock.lock().await;
        let mut records = self.read_records()?;
        records.push(record);
        self.write_json(PROJECTS_KEY, &records)?;

        info!(
            project_id = project.id.as_str(),
            name = project.name.as_str(),
            total = records.len(),
            "project saved"
        );
        Ok(project)
    }

    pub async fn list(&self) -> AppResult<Vec<Project>> {
        self.read_projects()
    }

    pub async fn load(&self, id: &str) -> AppResult<Project> {
        self.read_projects()?
            .into_iter()
            .find(|p| p.id == id)
            .ok_or_else(|| AppError::NotFound(format!("project {id}")))
    }

    /// Unknown ids leave the collection as it was.
    pub async fn delete(&self, id: &str) -> AppResult<bool> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.read_records()?;
        let before = records.len();
        records.retain(|r| r.get("id").and_then(Value::as_str) != Some(id));

        if records.len() == before {
            debug!(project_id = id, "delete of unknown project ignored");
            return Ok(false);
        }

        self.write_json(PROJECTS_KEY, &records)?;
        info!(project_id = id, total = records.len(), "project deleted");
        Ok(true)
    }

    pub async fn load_settings(&self) -> AppResult<Settings> {
        Ok(self.read_json(SETTINGS_KEY)?.unwrap_or_default())
    }

    pub async fn save_settings(&self, settings: &Settings) -> AppResult<()> {
        let _guard = self.write_lock.lock().await;
        self.write_json(SETTINGS_KEY, settings)
    }

    fn read_records(&self) -> AppResult<Vec<Value>> {
        Ok(self.read_json(PROJECTS_KEY)?.unwrap_or_default())
    }

    fn read_projects(&self) -> AppResult<Vec<Project>> {
        let projects = self
            .read_records()?
            .into_iter()
            .enumerate()
            .filter_map(|(index, record)| match serde_json::from_value(record) {
                Ok(project) => Some(project),
                Err(e) => {
                    warn!(index, error = %e, "skipping unreadable project record");
                    None
                }
            })
            .collect();
        Ok(projects)
    }

    /// A blob that no longer parses reads as absent.
    fn read_json<T: DeserializeOwned>(&self, key: &str) -> AppResult<Option<T>> {
        let Some(raw) = self.kv.get(key)? else {
            return Ok(None);
        };
        match serde_json::from_slice(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(key, error = %e, "stored blob is corrupted; treating as empty");
                Ok(None)
            }
        }
    }

    fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> AppResult<()> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| AppError::Storage(format!("failed to encode {key}: {e}")))?;
        self.kv.put(key, &bytes)
    }
}

/// Pretty JSON plus the download name; touches nothing.
pub fn export(project: &Project) -> AppResult<ProjectExport> {
    let json = serde_json::to_string_pretty(project)
        .map_err(|e| AppError::Storage(format!("failed to encode project: {e}")))?;
    Ok(ProjectExport {
        filename: format!("{}.json", project.name),
        json,
    })
}
