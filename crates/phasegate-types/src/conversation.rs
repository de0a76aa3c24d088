//! Conversation session records.
//!
//! A session is an append-only message log scoped to one agent. Messages are
//! never reordered or truncated on write; windowing happens on read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::default_schema_version;
use crate::memory::SaveOutcome;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Active,
    Completed,
    Blocked,
}

/// Task metadata attached to a session at start.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionMetadata {
    pub task_type: Option<String>,
    pub priority: Option<String>,
    pub related_agents: Vec<String>,
    pub workflow_phase: Option<String>,
}

impl SessionMetadata {
    /// Pick the well-known metadata keys out of a free-form start context.
    pub fn from_context(context: &Value) -> Self {
        let text = |key: &str| context.get(key).and_then(Value::as_str).map(String::from);
        Self {
            task_type: text("taskType"),
            priority: text("priority"),
            related_agents: context
                .get("relatedAgents")
                .and_then(Value::as_array)
                .map(|a| {
                    a.iter()
                        .filter_map(|v| v.as_str().map(String::from))
                        .collect()
                })
                .unwrap_or_default(),
            workflow_phase: text("workflowPhase"),
        }
    }
}

/// A single message in a session. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMessage {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub message_type: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub agent_response: Option<String>,
}

/// Caller-supplied fields for a message to append.
#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    pub message_type: String,
    pub content: String,
    pub metadata: Value,
    pub agent_response: Option<String>,
}

impl NewMessage {
    pub fn new(message_type: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            message_type: message_type.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Persistent conversation session, keyed by session id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSession {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub session_id: String,
    pub agent_name: String,
    pub start_time: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<ConversationMessage>,
    #[serde(default)]
    pub status: SessionStatus,
    /// The free-form context the session was started with.
    #[serde(default)]
    pub context: Value,
    #[serde(default)]
    pub metadata: SessionMetadata,
    /// Unrecognized fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ConversationSession {
    /// A new, empty, active session.
    pub fn new(agent: &str, session_id: &str, context: Value) -> Self {
        let now = Utc::now();
        Self {
            schema_version: crate::SCHEMA_VERSION,
            session_id: session_id.to_string(),
            agent_name: agent.to_string(),
            start_time: now,
            last_activity: now,
            messages: Vec::new(),
            status: SessionStatus::Active,
            metadata: SessionMetadata::from_context(&context),
            context,
            extra: Map::new(),
        }
    }

    /// Summary view of this session.
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            start_time: self.start_time,
            last_activity: self.last_activity,
            message_count: self.messages.len(),
            context: self.context.clone(),
            status: self.status,
        }
    }
}

/// Listing entry returned by recent-session discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub message_count: usize,
    pub context: Value,
    pub status: SessionStatus,
}

/// How an append located its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionResolution {
    /// The requested session existed and was appended to.
    Existing,
    /// The requested session was unknown; a new one was started.
    Created,
}

/// Result of starting a session.
#[derive(Debug, Clone, PartialEq)]
pub struct StartedSession {
    pub session_id: String,
    pub outcome: SaveOutcome,
}

/// Result of appending a message.
#[derive(Debug, Clone, PartialEq)]
pub struct AppendResult {
    /// The session the message actually landed in. May differ from the
    /// requested id when `resolution` is `Created`.
    pub session_id: String,
    pub resolution: SessionResolution,
    pub message_id: String,
    pub outcome: SaveOutcome,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metadata_from_context() {
        let ctx = json!({
            "taskType": "workflow",
            "priority": "high",
            "relatedAgents": ["Architect", 7, "QAEngineer"],
            "other": true
        });
        let meta = SessionMetadata::from_context(&ctx);
        assert_eq!(meta.task_type.as_deref(), Some("workflow"));
        assert_eq!(meta.priority.as_deref(), Some("high"));
        assert_eq!(meta.related_agents, vec!["Architect", "QAEngineer"]);
        assert!(meta.workflow_phase.is_none());
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_value(SessionStatus::Blocked).unwrap(),
            json!("blocked")
        );
    }

    #[test]
    fn test_session_summary() {
        let mut s = ConversationSession::new("Architect", "Architect-0badc0de", json!({}));
        s.messages.push(ConversationMessage {
            id: "m1".into(),
            timestamp: Utc::now(),
            message_type: "task".into(),
            content: "design it".into(),
            metadata: Value::Null,
            agent_response: None,
        });
        let summary = s.summary();
        assert_eq!(summary.message_count, 1);
        assert_eq!(summary.status, SessionStatus::Active);
    }
}
