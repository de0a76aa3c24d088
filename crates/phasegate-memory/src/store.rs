//! File-backed record persistence.
//!
//! Layout under the storage root:
//!
//! ```text
//! context/{agent}.json                  one AgentMemory per agent
//! conversations/{agent}-{session}.json  one ConversationSession per session
//! learning/, decisions/                 reserved
//! ```
//!
//! Reads never fail the caller: a missing file is `None`, and a corrupt or
//! too-new file is logged as a decode error and also reported as `None` so the
//! caller falls back to defaults. Writes overwrite the whole file in place.

use async_trait::async_trait;
use phasegate_types::agent::{validate_agent_name, validate_session_id};
use phasegate_types::conversation::ConversationSession;
use phasegate_types::error::{PhasegateError, PhasegateResult};
use phasegate_types::memory::AgentMemory;
use phasegate_types::SCHEMA_VERSION;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tracing::{debug, info, warn};

/// Subdirectory holding agent memory records.
pub const CONTEXT_DIR: &str = "context";
/// Subdirectory holding conversation session records.
pub const CONVERSATIONS_DIR: &str = "conversations";
/// Reserved subdirectories, created but unused by the core.
pub const RESERVED_DIRS: [&str; 2] = ["learning", "decisions"];

/// A conversation file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSession {
    pub session_id: String,
    pub modified: SystemTime,
}

/// Persistence for the two record families.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Load an agent's memory. `None` if missing or undecodable.
    async fn load_memory(&self, agent: &str) -> Option<AgentMemory>;

    /// Overwrite an agent's memory record.
    async fn save_memory(&self, agent: &str, memory: &AgentMemory) -> PhasegateResult<()>;

    /// Load a session. `None` if missing or undecodable.
    async fn load_session(&self, agent: &str, session_id: &str) -> Option<ConversationSession>;

    /// Overwrite a session record.
    async fn save_session(&self, session: &ConversationSession) -> PhasegateResult<()>;

    /// Whether a session file exists, decodable or not.
    async fn session_exists(&self, agent: &str, session_id: &str) -> bool;

    /// Session files belonging to `agent`, in directory order.
    async fn list_sessions(&self, agent: &str) -> PhasegateResult<Vec<StoredSession>>;

    /// Delete every conversation file modified before `cutoff`.
    ///
    /// Returns the file stems (`{agent}-{session}`) that were removed.
    async fn sweep_sessions(&self, cutoff: SystemTime) -> PhasegateResult<Vec<String>>;
}

/// JSON files under a storage root.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Open a store and eagerly create its directory structure.
    pub async fn open(root: impl Into<PathBuf>) -> PhasegateResult<Self> {
        let store = Self::new(root);
        store.ensure_layout().await?;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create `context/`, `conversations/` and the reserved directories.
    pub async fn ensure_layout(&self) -> PhasegateResult<()> {
        for dir in [CONTEXT_DIR, CONVERSATIONS_DIR]
            .into_iter()
            .chain(RESERVED_DIRS)
        {
            fs::create_dir_all(self.root.join(dir)).await?;
        }
        debug!(root = %self.root.display(), "Storage layout ready");
        Ok(())
    }

    pub fn memory_path(&self, agent: &str) -> PathBuf {
        self.root.join(CONTEXT_DIR).join(format!("{agent}.json"))
    }

    pub fn session_path(&self, agent: &str, session_id: &str) -> PathBuf {
        self.root
            .join(CONVERSATIONS_DIR)
            .join(format!("{agent}-{session_id}.json"))
    }

    fn conversations_dir(&self) -> PathBuf {
        self.root.join(CONVERSATIONS_DIR)
    }

    async fn read_record<T: DeserializeOwned>(path: &Path) -> Option<T> {
        let bytes = match fs::read(path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read record, using defaults");
                return None;
            }
        };
        match Self::decode(path, &bytes) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(error = %e, "Corrupt record, using defaults");
                None
            }
        }
    }

    fn decode<T: DeserializeOwned>(path: &Path, bytes: &[u8]) -> PhasegateResult<T> {
        let decode_err = |reason: String| PhasegateError::Decode {
            path: path.display().to_string(),
            reason,
        };
        let value: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| decode_err(e.to_string()))?;
        if let Some(version) = value.get("schemaVersion").and_then(|v| v.as_u64()) {
            if version > u64::from(SCHEMA_VERSION) {
                return Err(decode_err(format!(
                    "schema version {version} is newer than supported {SCHEMA_VERSION}"
                )));
            }
        }
        serde_json::from_value(value).map_err(|e| decode_err(e.to_string()))
    }

    async fn write_record<T: Serialize + Sync>(path: &Path, record: &T) -> PhasegateResult<()> {
        let write_err = |reason: String| PhasegateError::Write {
            path: path.display().to_string(),
            reason,
        };
        let body = serde_json::to_vec_pretty(record).map_err(|e| write_err(e.to_string()))?;
        fs::write(path, body)
            .await
            .map_err(|e| write_err(e.to_string()))
    }
}

#[async_trait]
impl RecordStore for FileStore {
    async fn load_memory(&self, agent: &str) -> Option<AgentMemory> {
        if validate_agent_name(agent).is_err() {
            return None;
        }
        Self::read_record(&self.memory_path(agent)).await
    }

    async fn save_memory(&self, agent: &str, memory: &AgentMemory) -> PhasegateResult<()> {
        validate_agent_name(agent)?;
        Self::write_record(&self.memory_path(agent), memory).await
    }

    async fn load_session(&self, agent: &str, session_id: &str) -> Option<ConversationSession> {
        if validate_agent_name(agent).is_err() || validate_session_id(session_id).is_err() {
            return None;
        }
        Self::read_record(&self.session_path(agent, session_id)).await
    }

    async fn save_session(&self, session: &ConversationSession) -> PhasegateResult<()> {
        validate_agent_name(&session.agent_name)?;
        validate_session_id(&session.session_id)?;
        let path = self.session_path(&session.agent_name, &session.session_id);
        Self::write_record(&path, session).await
    }

    async fn session_exists(&self, agent: &str, session_id: &str) -> bool {
        fs::try_exists(self.session_path(agent, session_id))
            .await
            .unwrap_or(false)
    }

    async fn list_sessions(&self, agent: &str) -> PhasegateResult<Vec<StoredSession>> {
        let prefix = format!("{agent}-");
        let mut found = Vec::new();
        let mut entries = match fs::read_dir(self.conversations_dir()).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(found),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(session_id) = name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(".json"))
            else {
                continue;
            };
            let modified = match entry.metadata().await.and_then(|m| m.modified()) {
                Ok(t) => t,
                Err(e) => {
                    warn!(file = %name, error = %e, "Skipping session file without mtime");
                    continue;
                }
            };
            found.push(StoredSession {
                session_id: session_id.to_string(),
                modified,
            });
        }
        Ok(found)
    }

    async fn sweep_sessions(&self, cutoff: SystemTime) -> PhasegateResult<Vec<String>> {
        let mut removed = Vec::new();
        let mut entries = match fs::read_dir(self.conversations_dir()).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(removed),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let modified = match entry.metadata().await.and_then(|m| m.modified()) {
                Ok(t) => t,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Cannot stat conversation file");
                    continue;
                }
            };
            if modified >= cutoff {
                continue;
            }
            match fs::remove_file(&path).await {
                Ok(()) => {
                    info!(path = %path.display(), "Deleted expired conversation");
                    if let Some(stem) = path.file_stem() {
                        removed.push(stem.to_string_lossy().into_owned());
                    }
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to delete expired conversation");
                }
            }
        }
        Ok(removed)
    }
}
