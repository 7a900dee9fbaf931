//! Short-term, per-session conversation memory.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::Agent => f.write_str("agent"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into(), timestamp: Utc::now() }
    }
}

/// Append-only message lists keyed by session id. Lives for the process.
#[derive(Debug, Default)]
pub struct SessionMemory {
    sessions: RwLock<HashMap<String, Vec<Message>>>,
}

impl SessionMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn append(&self, session_id: &str, message: Message) {
        self.sessions.write().await.entry(session_id.to_string()).or_default().push(message);
    }

    /// Messages of `session_id` in insertion order; empty for unknown sessions.
    pub async fn history(&self, session_id: &str) -> Vec<Message> {
        self.sessions.read().await.get(session_id).cloned().unwrap_or_default()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
