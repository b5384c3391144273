//! Chat session management
//!
//! A session is the conversation history for multi-turn question answering. Each one is
//! stored as JSON at `data_dir/sessions/<id>/state.json`.
use crate::error::{RaglineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "Assistant",
        }
    }
}

/// One message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub at: DateTime<Utc>,
    /// Source labels cited by an assistant turn
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
}

/// A chat session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    /// Unique session identifier
    pub id: Uuid,

    /// Human-readable session name
    pub name: String,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub turns: Vec<Turn>,

    /// Custom metadata
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ChatSession {
    /// Create a new session
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            created_at: now,
            updated_at: now,
            turns: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Create a new session with generated name based on timestamp
    pub fn new_with_timestamp() -> Self {
        let name = format!("chat_{}", Utc::now().format("%Y%m%d_%H%M%S"));
        Self::new(name)
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.push(Role::User, content.into(), Vec::new());
    }

    pub fn push_assistant(&mut self, content: impl Into<String>, sources: Vec<String>) {
        self.push(Role::Assistant, content.into(), sources);
    }

    fn push(&mut self, role: Role, content: String, sources: Vec<String>) {
        let at = Utc::now();
        self.turns.push(Turn {
            role,
            content,
            at,
            sources,
        });
        self.updated_at = at;
    }

    /// The last `n` turns, oldest first
    pub fn recent(&self, n: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    /// Render recent turns as `Role: text` lines for a prompt
    pub fn history_text(&self, n: usize) -> String {
        self.recent(n)
            .iter()
            .map(|turn| format!("{}: {}", turn.role.as_str(), turn.content.trim()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Save session to file
    pub fn save(&self, data_dir: &Path) -> Result<()> {
        let session_dir = self.session_dir(data_dir);
        std::fs::create_dir_all(&session_dir).map_err(|e| RaglineError::Io {
            source: e,
            context: format!(
                "Failed to create session directory: {}",
                session_dir.display()
            ),
        })?;

        let state_file = session_dir.join("state.json");
        let content = serde_json::to_string_pretty(self).map_err(|e| RaglineError::Json {
            source: e,
            context: "Failed to serialize session state".to_string(),
        })?;
        std::fs::write(&state_file, content).map_err(|e| RaglineError::Io {
            source: e,
            context: format!(
                "Failed to write session state file: {}",
                state_file.display()
            ),
        })?;

        Ok(())
    }

    /// Load session from file
    pub fn load(data_dir: &Path, id: &Uuid) -> Result<Self> {
        let state_file = data_dir
            .join("sessions")
            .join(id.to_string())
            .join("state.json");

        if !state_file.exists() {
            return Err(RaglineError::SessionNotFound { id: id.to_string() });
        }

        let content = std::fs::read_to_string(&state_file).map_err(|e| RaglineError::Io {
            source: e,
            context: format!(
                "Failed to read session state file: {}",
                state_file.display()
            ),
        })?;
        let session = serde_json::from_str(&content).map_err(|e| RaglineError::Json {
            source: e,
            context: "Failed to deserialize session state".to_string(),
        })?;

        Ok(session)
    }

    /// Get the directory for this session
    pub fn session_dir(&self, data_dir: &Path) -> PathBuf {
        data_dir.join("sessions").join(self.id.to_string())
    }
}

/// Session manager for CRUD operations
pub struct SessionManager {
    data_dir: PathBuf,
}

impl SessionManager {
    /// Create a new session manager
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    /// Create and persist a new session
    pub fn create_session(&self, name: Option<String>) -> Result<ChatSession> {
        let session = match name {
            Some(n) => ChatSession::new(n),
            None => ChatSession::new_with_timestamp(),
        };

        session.save(&self.data_dir)?;
        tracing::info!("Created chat session {} ({})", session.name, session.id);
        Ok(session)
    }

    /// Persist a session after new turns
    pub fn save(&self, session: &ChatSession) -> Result<()> {
        session.save(&self.data_dir)
    }

    /// Load a session by ID
    pub fn load_session(&self, id: &Uuid) -> Result<ChatSession> {
        ChatSession::load(&self.data_dir, id)
    }

    /// Resolve a session by id or name, creating it when `name_or_id` names nothing
    pub fn open_or_create(&self, name_or_id: Option<&str>) -> Result<ChatSession> {
        let Some(key) = name_or_id else {
            return self.create_session(None);
        };

        if let Ok(id) = Uuid::parse_str(key) {
            return self.load_session(&id);
        }

        match self.find_by_name(key)? {
            Some(session) => Ok(session),
            None => self.create_session(Some(key.to_string())),
        }
    }

    /// List all sessions
    pub fn list_sessions(&self) -> Result<Vec<ChatSession>> {
        let sessions_dir = self.data_dir.join("sessions");

        if !sessions_dir.exists() {
            return Ok(Vec::new());
        }

        let mut sessions = Vec::new();

        for entry in std::fs::read_dir(&sessions_dir).map_err(|e| RaglineError::Io {
            source: e,
            context: format!(
                "Failed to read sessions directory: {}",
                sessions_dir.display()
            ),
        })? {
            let entry = entry.map_err(|e| RaglineError::Io {
                source: e,
                context: "Failed to read directory entry".to_string(),
            })?;

            if entry.path().is_dir() {
                if let Ok(id) = Uuid::parse_str(&entry.file_name().to_string_lossy()) {
                    match ChatSession::load(&self.data_dir, &id) {
                        Ok(session) => sessions.push(session),
                        Err(e) => tracing::warn!("Skipping unreadable session {}: {}", id, e),
                    }
                }
            }
        }

        // Most recently active first
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        Ok(sessions)
    }

    /// Find session by name
    pub fn find_by_name(&self, name: &str) -> Result<Option<ChatSession>> {
        let sessions = self.list_sessions()?;
        Ok(sessions.into_iter().find(|s| s.name == name))
    }

    /// Delete a session
    pub fn delete_session(&self, id: &Uuid) -> Result<()> {
        let session_dir = self.data_dir.join("sessions").join(id.to_string());

        if !session_dir.exists() {
            return Err(RaglineError::SessionNotFound { id: id.to_string() });
        }

        std::fs::remove_dir_all(&session_dir).map_err(|e| RaglineError::Io {
            source: e,
            context: format!(
                "Failed to delete session directory: {}",
                session_dir.display()
            ),
        })?;
        Ok(())
    }
}
