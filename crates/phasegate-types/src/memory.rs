//! Agent memory records: learnings, relationships, workflow annotations and
//! the read-only projections built from them.
//!
//! Field names are camelCase on disk. Every record keeps unknown fields in a
//! flattened `extra` map so that newer writers' data survives a round-trip
//! through an older reader.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

use crate::conversation::ConversationMessage;
use crate::default_schema_version;

/// Persistent memory for a single agent, keyed by agent name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentMemory {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub agent_name: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    /// Free-form context, opaque to the core.
    pub personal_context: Map<String, Value>,
    /// Free-form preferences, opaque to the core.
    pub preferences: Map<String, Value>,
    /// Phase name or workflow id -> latest state annotation.
    pub workflow_state: BTreeMap<String, WorkflowStateEntry>,
    /// Oldest first. Bounded by the configured learning capacity.
    pub learnings: Vec<Learning>,
    pub metrics: AgentMetrics,
    /// Target agent name -> aggregated interaction stats.
    pub relationships: BTreeMap<String, Relationship>,
    pub reminders: Vec<Reminder>,
    /// Unrecognized fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AgentMemory {
    /// A fresh record with default contents for `agent`.
    pub fn new(agent: &str) -> Self {
        let now = Utc::now();
        Self {
            schema_version: crate::SCHEMA_VERSION,
            agent_name: agent.to_string(),
            created_at: now,
            last_accessed: now,
            last_updated: now,
            personal_context: Map::new(),
            preferences: Map::new(),
            workflow_state: BTreeMap::new(),
            learnings: Vec::new(),
            metrics: AgentMetrics::default(),
            relationships: BTreeMap::new(),
            reminders: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Reminders not yet marked complete.
    pub fn incomplete_reminders(&self) -> impl Iterator<Item = &Reminder> {
        self.reminders.iter().filter(|r| !r.completed)
    }
}

impl Default for AgentMemory {
    fn default() -> Self {
        Self::new("")
    }
}

/// A workflow state annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStateEntry {
    pub state: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Value,
}

/// A timestamped insight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Learning {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub learning_type: String,
    pub content: String,
    #[serde(default)]
    pub context: Value,
    /// In `[0, 1]`.
    pub confidence: f64,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

/// Caller-supplied fields for a new learning. Unset fields take defaults.
#[derive(Debug, Clone, Default)]
pub struct NewLearning {
    pub learning_type: Option<String>,
    pub content: String,
    pub context: Value,
    pub confidence: Option<f64>,
    pub tags: BTreeSet<String>,
}

impl NewLearning {
    pub const DEFAULT_TYPE: &'static str = "insight";
    pub const DEFAULT_CONFIDENCE: f64 = 0.8;

    /// A learning with only content set.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    /// Set the learning type.
    pub fn with_type(mut self, learning_type: impl Into<String>) -> Self {
        self.learning_type = Some(learning_type.into());
        self
    }

    /// Attach a context object.
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }
}

/// Interaction and performance counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentMetrics {
    /// Incremented exactly once per persisted save.
    pub total_interactions: u64,
    pub successful_tasks: u64,
    pub average_response_time: f64,
    pub specializations: Vec<String>,
}

/// Aggregated interaction statistics toward one other agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Relationship {
    pub total_interactions: u64,
    pub last_interaction: Option<DateTime<Utc>>,
    pub interaction_types: BTreeMap<String, u64>,
    /// Oldest first. Bounded by the configured history capacity.
    pub collaboration_history: Vec<CollaborationEntry>,
}

impl Relationship {
    /// The interaction type with the highest count.
    ///
    /// Ties go to the lexicographically smallest type.
    pub fn most_frequent_type(&self) -> Option<&str> {
        let mut best: Option<(&str, u64)> = None;
        for (kind, count) in &self.interaction_types {
            match best {
                Some((_, c)) if *count <= c => {}
                _ => best = Some((kind.as_str(), *count)),
            }
        }
        best.map(|(k, _)| k)
    }
}

/// A single recorded collaboration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollaborationEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub interaction_type: String,
    #[serde(default)]
    pub details: Value,
}

/// A to-do note attached to an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    pub content: String,
    #[serde(default)]
    pub completed: bool,
}

/// Whether a write reached disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SaveOutcome {
    /// Written to disk and cache.
    Persisted,
    /// Cache updated, disk write failed. Cache and disk may now diverge.
    CachedOnly { error: String },
}

impl SaveOutcome {
    pub fn is_durable(&self) -> bool {
        matches!(self, SaveOutcome::Persisted)
    }

    /// Human-readable warning for degraded writes.
    pub fn warning(&self) -> Option<String> {
        match self {
            SaveOutcome::Persisted => None,
            SaveOutcome::CachedOnly { error } => {
                Some(format!("change kept in memory only, not persisted: {error}"))
            }
        }
    }

    /// Combine two outcomes, keeping the first degradation.
    pub fn and(self, other: SaveOutcome) -> SaveOutcome {
        match self {
            SaveOutcome::Persisted => other,
            degraded => degraded,
        }
    }
}

/// Summary of one relationship for context projections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipSummary {
    pub agent: String,
    pub total_interactions: u64,
    pub last_interaction: Option<DateTime<Utc>>,
    pub most_frequent_type: Option<String>,
}

/// Read-only context projection for an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentContext {
    pub agent: String,
    pub metrics: AgentMetrics,
    pub recent_learnings: Vec<Learning>,
    pub pending_reminders: Vec<Reminder>,
    pub relationships: Vec<RelationshipSummary>,
    pub workflow_state: BTreeMap<String, WorkflowStateEntry>,
    pub conversation_history: Option<Vec<ConversationMessage>>,
}

impl AgentContext {
    /// Keep only relationships toward the given agents.
    pub fn restricted_to<S: AsRef<str>>(mut self, participants: &[S]) -> Self {
        self.relationships
            .retain(|r| participants.iter().any(|p| p.as_ref() == r.agent));
        self
    }
}

/// Aggregate counts for reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySummary {
    pub agent: String,
    pub total_interactions: u64,
    pub learnings: usize,
    pub incomplete_reminders: usize,
    pub relationships: usize,
    pub recent_conversations: usize,
    pub last_updated: DateTime<Utc>,
}
