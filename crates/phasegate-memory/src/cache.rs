//! Read-through / write-through cache over a [`RecordStore`].
//!
//! Memories are keyed by agent name, sessions by session id. There is no TTL
//! and no size bound: the cache lives as long as the substrate and holds every
//! agent and session touched during that time.
//!
//! `put_*` updates the map unconditionally, then writes to the store. A failed
//! write therefore leaves cache and disk diverged; the returned
//! [`SaveOutcome`] says so.
//!
//! A record loaded on a miss only fills an empty slot. If a `put_*` landed
//! while the load was in flight, the cached record wins and the load is
//! discarded.

use dashmap::DashMap;
use phasegate_types::conversation::ConversationSession;
use phasegate_types::memory::{AgentMemory, SaveOutcome};
use std::collections::HashSet;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::store::RecordStore;

/// Thread-safe cache of memory and session records.
pub struct MemoryCache {
    store: Arc<dyn RecordStore>,
    memories: DashMap<String, AgentMemory>,
    sessions: DashMap<String, ConversationSession>,
}

impl MemoryCache {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            memories: DashMap::new(),
            sessions: DashMap::new(),
        }
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Cached or stored memory for `agent`. Populates the cache on a hit.
    pub async fn get_memory(&self, agent: &str) -> Option<AgentMemory> {
        if let Some(entry) = self.memories.get(agent) {
            return Some(entry.clone());
        }
        debug!(agent, "Memory cache miss");
        let loaded = self.store.load_memory(agent).await?;
        let cached = self
            .memories
            .entry(agent.to_string())
            .or_insert(loaded)
            .clone();
        Some(cached)
    }

    /// Bump `last_accessed` on the cached memory in place, caching `fallback`
    /// first if nothing is cached. Returns the cached record. Never touches
    /// the store.
    pub fn touch_memory(
        &self,
        agent: &str,
        fallback: AgentMemory,
        now: DateTime<Utc>,
    ) -> AgentMemory {
        let mut entry = self.memories.entry(agent.to_string()).or_insert(fallback);
        if now > entry.last_accessed {
            entry.last_accessed = now;
        }
        entry.clone()
    }

    /// Write `memory` to the cache, then to the store.
    pub async fn put_memory(&self, agent: &str, memory: &AgentMemory) -> SaveOutcome {
        self.memories.insert(agent.to_string(), memory.clone());
        match self.store.save_memory(agent, memory).await {
            Ok(()) => SaveOutcome::Persisted,
            Err(e) => {
                warn!(agent, error = %e, "Memory write failed; cache and disk diverge");
                SaveOutcome::CachedOnly {
                    error: e.to_string(),
                }
            }
        }
    }

    /// Cached or stored session owned by `agent`. Populates the cache on a
    /// hit. A session belonging to another agent is reported as absent.
    pub async fn get_session(&self, agent: &str, session_id: &str) -> Option<ConversationSession> {
        if let Some(entry) = self.sessions.get(session_id) {
            return owned_by(agent, entry.clone());
        }
        debug!(agent, session_id, "Session cache miss");
        let loaded = self.store.load_session(agent, session_id).await?;
        let cached = self
            .sessions
            .entry(session_id.to_string())
            .or_insert(loaded)
            .clone();
        owned_by(agent, cached)
    }

    /// Write `session` to the cache, then to the store.
    pub async fn put_session(&self, session: &ConversationSession) -> SaveOutcome {
        self.sessions
            .insert(session.session_id.clone(), session.clone());
        match self.store.save_session(session).await {
            Ok(()) => SaveOutcome::Persisted,
            Err(e) => {
                warn!(
                    session_id = %session.session_id,
                    error = %e,
                    "Session write failed; cache and disk diverge"
                );
                SaveOutcome::CachedOnly {
                    error: e.to_string(),
                }
            }
        }
    }

    /// Whether `session_id` is cached (without consulting the store).
    pub fn has_session(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Drop cached sessions whose files (`{agent}-{session}` stems) were removed.
    pub fn evict_session_files(&self, stems: &[String]) -> usize {
        if stems.is_empty() {
            return 0;
        }
        let stems: HashSet<&str> = stems.iter().map(String::as_str).collect();
        let before = self.sessions.len();
        self.sessions.retain(|id, s| {
            !stems.contains(format!("{}-{}", s.agent_name, id).as_str())
        });
        before - self.sessions.len()
    }

    /// Forget everything cached. Stored records are untouched.
    pub fn clear(&self) {
        self.memories.clear();
        self.sessions.clear();
    }

    /// Number of cached memories and sessions.
    pub fn counts(&self) -> (usize, usize) {
        (self.memories.len(), self.sessions.len())
    }
}

fn owned_by(agent: &str, session: ConversationSession) -> Option<ConversationSession> {
    if session.agent_name == agent {
        Some(session)
    } else {
        debug!(
            agent,
            owner = %session.agent_name,
            session_id = %session.session_id,
            "Session belongs to another agent"
        );
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FileStore;
    use serde_json::json;

    async fn setup() -> (tempfile::TempDir, Arc<FileStore>, MemoryCache) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileStore::open(dir.path()).await.unwrap());
        let cache = MemoryCache::new(store.clone());
        (dir, store, cache)
    }

    #[tokio::test]
    async fn test_read_through_populates() {
        let (_dir, store, cache) = setup().await;
        let mem = AgentMemory::new("Architect");
        store.save_memory("Architect", &mem).await.unwrap();

        assert_eq!(cache.counts(), (0, 0));
        assert_eq!(cache.get_memory("Architect").await, Some(mem));
        assert_eq!(cache.counts(), (1, 0));
    }

    #[tokio::test]
    async fn test_cache_served_after_disk_removed() {
        let (_dir, store, cache) = setup().await;
        let mem = AgentMemory::new("Architect");
        assert!(cache.put_memory("Architect", &mem).await.is_durable());
        std::fs::remove_file(store.memory_path("Architect")).unwrap();
        assert!(cache.get_memory("Architect").await.is_some());

        cache.clear();
        assert!(cache.get_memory("Architect").await.is_none());
    }

    #[tokio::test]
    async fn test_failed_write_still_caches() {
        let (_dir, store, cache) = setup().await;
        std::fs::create_dir_all(store.memory_path("Architect")).unwrap();

        let outcome = cache
            .put_memory("Architect", &AgentMemory::new("Architect"))
            .await;
        assert!(matches!(outcome, SaveOutcome::CachedOnly { .. }));
        assert!(cache.get_memory("Architect").await.is_some());
    }

    #[tokio::test]
    async fn test_session_scoped_to_owner() {
        let (_dir, _store, cache) = setup().await;
        let qa = ConversationSession::new("QAEngineer", "QAEngineer-33333333", json!({}));
        cache.put_session(&qa).await;

        assert!(cache.get_session("QAEngineer", "QAEngineer-33333333").await.is_some());
        assert!(cache.get_session("Architect", "QAEngineer-33333333").await.is_none());
    }

    #[tokio::test]
    async fn test_touch_keeps_newer_entry() {
        let (_dir, _store, cache) = setup().await;
        let mut stale = AgentMemory::new("Architect");
        stale.personal_context.insert("stale".to_string(), json!(true));
        let mut fresh = AgentMemory::new("Architect");
        fresh.personal_context.insert("fresh".to_string(), json!(true));
        cache.put_memory("Architect", &fresh).await;

        let touched = cache.touch_memory("Architect", stale, Utc::now());
        assert!(touched.personal_context.contains_key("fresh"));
        assert!(!touched.personal_context.contains_key("stale"));
        assert!(touched.last_accessed >= fresh.last_accessed);
    }

    #[tokio::test]
    async fn test_evict_session_files() {
        let (_dir, _store, cache) = setup().await;
        let a = ConversationSession::new("Architect", "Architect-11111111", json!({}));
        let b = ConversationSession::new("Architect", "Architect-22222222", json!({}));
        cache.put_session(&a).await;
        cache.put_session(&b).await;

        let evicted = cache.evict_session_files(&["Architect-Architect-11111111".to_string()]);
        assert_eq!(evicted, 1);
        assert!(!cache.has_session("Architect-11111111"));
        assert!(cache.has_session("Architect-22222222"));
    }
}
