//! Agent memory lifecycle: lazy creation, bounded learnings, relationship
//! aggregation, workflow annotations and read-only projections.
//!
//! Mutating operations take the agent's lock, read the current record, modify
//! it and save it, so concurrent mutations of one agent never lose updates.
//! [`AgentMemoryManager::save_agent_memory`] is the exception: it writes the
//! caller's snapshot as-is, and two callers saving snapshots taken from the
//! same state race with last-writer-wins semantics.

use chrono::Utc;
use phasegate_types::agent::validate_agent_name;
use phasegate_types::config::MemoryConfig;
use phasegate_types::error::PhasegateResult;
use phasegate_types::memory::{
    AgentContext, AgentMemory, CollaborationEntry, Learning, MemorySummary, NewLearning,
    RelationshipSummary, SaveOutcome, WorkflowStateEntry,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info};
use uuid::Uuid;

use crate::cache::MemoryCache;
use crate::conversation::ConversationManager;
use crate::locks::KeyedLocks;

/// Owns [`AgentMemory`] records.
pub struct AgentMemoryManager {
    cache: Arc<MemoryCache>,
    conversations: Arc<ConversationManager>,
    locks: KeyedLocks,
    config: MemoryConfig,
}

impl AgentMemoryManager {
    pub fn new(
        cache: Arc<MemoryCache>,
        conversations: Arc<ConversationManager>,
        config: MemoryConfig,
    ) -> Self {
        Self {
            cache,
            conversations,
            locks: KeyedLocks::new(),
            config,
        }
    }

    /// Cached, stored, or freshly defaulted memory for `agent`.
    ///
    /// Bumps `last_accessed` in the cache only; it reaches disk with the next
    /// save.
    pub async fn get_agent_memory(&self, agent: &str) -> PhasegateResult<AgentMemory> {
        validate_agent_name(agent)?;
        let fallback = match self.cache.get_memory(agent).await {
            Some(m) => m,
            None => {
                debug!(agent, "Creating default agent memory");
                AgentMemory::new(agent)
            }
        };
        Ok(self.cache.touch_memory(agent, fallback, Utc::now()))
    }

    /// Stamp, count and persist `memory`.
    ///
    /// Sets `last_updated`, increments `metrics.total_interactions` once, and
    /// writes through the cache. The caller's struct is updated in place.
    pub async fn save_agent_memory(&self, agent: &str, memory: &mut AgentMemory) -> SaveOutcome {
        memory.last_updated = Utc::now();
        memory.metrics.total_interactions += 1;
        if memory.agent_name.is_empty() {
            memory.agent_name = agent.to_string();
        }
        self.cache.put_memory(agent, memory).await
    }

    /// Append a learning, evicting the oldest beyond capacity.
    pub async fn add_learning(
        &self,
        agent: &str,
        learning: NewLearning,
    ) -> PhasegateResult<(Learning, SaveOutcome)> {
        validate_agent_name(agent)?;
        let _guard = self.locks.lock(agent).await;
        let mut memory = self.get_agent_memory(agent).await?;

        let entry = Learning {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            learning_type: learning
                .learning_type
                .unwrap_or_else(|| NewLearning::DEFAULT_TYPE.to_string()),
            content: learning.content,
            context: learning.context,
            confidence: learning
                .confidence
                .unwrap_or(NewLearning::DEFAULT_CONFIDENCE)
                .clamp(0.0, 1.0),
            tags: learning.tags,
        };
        memory.learnings.push(entry.clone());
        let overflow = memory
            .learnings
            .len()
            .saturating_sub(self.config.learning_capacity);
        if overflow > 0 {
            memory.learnings.drain(..overflow);
            debug!(agent, evicted = overflow, "Evicted oldest learnings");
        }

        let outcome = self.save_agent_memory(agent, &mut memory).await;
        Ok((entry, outcome))
    }

    /// Upsert `workflow_state[key]`.
    pub async fn update_workflow_state(
        &self,
        agent: &str,
        key: &str,
        state: &str,
        metadata: Value,
    ) -> PhasegateResult<SaveOutcome> {
        validate_agent_name(agent)?;
        let _guard = self.locks.lock(agent).await;
        let mut memory = self.get_agent_memory(agent).await?;
        memory.workflow_state.insert(
            key.to_string(),
            WorkflowStateEntry {
                state: state.to_string(),
                timestamp: Utc::now(),
                metadata,
            },
        );
        Ok(self.save_agent_memory(agent, &mut memory).await)
    }

    /// Count an interaction from `agent` toward `target`.
    pub async fn record_agent_interaction(
        &self,
        agent: &str,
        target: &str,
        interaction_type: &str,
        details: Value,
    ) -> PhasegateResult<SaveOutcome> {
        validate_agent_name(agent)?;
        let _guard = self.locks.lock(agent).await;
        let mut memory = self.get_agent_memory(agent).await?;
        let now = Utc::now();

        let rel = memory.relationships.entry(target.to_string()).or_default();
        rel.total_interactions += 1;
        rel.last_interaction = Some(now);
        *rel
            .interaction_types
            .entry(interaction_type.to_string())
            .or_insert(0) += 1;
        rel.collaboration_history.push(CollaborationEntry {
            timestamp: now,
            interaction_type: interaction_type.to_string(),
            details,
        });
        let overflow = rel
            .collaboration_history
            .len()
            .saturating_sub(self.config.collaboration_history_capacity);
        rel.collaboration_history.drain(..overflow);

        Ok(self.save_agent_memory(agent, &mut memory).await)
    }

    /// Read-only context projection.
    ///
    /// With `include_history` and a `session_id`, the last few messages of
    /// that session are attached.
    pub async fn get_agent_context(
        &self,
        agent: &str,
        session_id: Option<&str>,
        include_history: bool,
    ) -> PhasegateResult<AgentContext> {
        let memory = self.get_agent_memory(agent).await?;

        let skip = memory
            .learnings
            .len()
            .saturating_sub(self.config.context_learnings);
        let recent_learnings = memory.learnings[skip..].to_vec();

        let relationships = memory
            .relationships
            .iter()
            .map(|(target, rel)| RelationshipSummary {
                agent: target.clone(),
                total_interactions: rel.total_interactions,
                last_interaction: rel.last_interaction,
                most_frequent_type: rel.most_frequent_type().map(String::from),
            })
            .collect();

        let conversation_history = match (include_history, session_id) {
            (true, Some(id)) => Some(
                self.conversations
                    .get_conversation_history(id, agent, Some(self.config.context_messages))
                    .await,
            ),
            _ => None,
        };

        Ok(AgentContext {
            agent: agent.to_string(),
            metrics: memory.metrics.clone(),
            recent_learnings,
            pending_reminders: memory.incomplete_reminders().cloned().collect(),
            relationships,
            workflow_state: memory.workflow_state,
            conversation_history,
        })
    }

    /// Delete conversation files older than `retention_days`.
    ///
    /// Agent memory files are never touched. Returns the number of files
    /// deleted.
    pub async fn cleanup_old_data(&self, retention_days: u32) -> PhasegateResult<usize> {
        let cutoff = SystemTime::now()
            .checked_sub(Duration::from_secs(u64::from(retention_days) * 86_400))
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let removed = self.cache.store().sweep_sessions(cutoff).await?;
        let evicted = self.cache.evict_session_files(&removed);
        info!(
            retention_days,
            deleted = removed.len(),
            evicted,
            "Conversation retention sweep finished"
        );
        Ok(removed.len())
    }

    /// Aggregate counts for reporting.
    pub async fn get_memory_summary(&self, agent: &str) -> PhasegateResult<MemorySummary> {
        let memory = self.get_agent_memory(agent).await?;
        let recent = self
            .conversations
            .get_recent_conversations(agent, None)
            .await?;
        Ok(MemorySummary {
            agent: agent.to_string(),
            total_interactions: memory.metrics.total_interactions,
            learnings: memory.learnings.len(),
            incomplete_reminders: memory.incomplete_reminders().count(),
            relationships: memory.relationships.len(),
            recent_conversations: recent.len(),
            last_updated: memory.last_updated,
        })
    }
}
