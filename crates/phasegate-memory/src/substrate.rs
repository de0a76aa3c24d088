//! The assembled memory substrate.

use phasegate_types::config::MemoryConfig;
use phasegate_types::error::PhasegateResult;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::agent_memory::AgentMemoryManager;
use crate::cache::MemoryCache;
use crate::conversation::ConversationManager;
use crate::store::{FileStore, RecordStore};

/// Store, cache and both managers, sharing one cache.
#[derive(Clone)]
pub struct MemorySubstrate {
    cache: Arc<MemoryCache>,
    agents: Arc<AgentMemoryManager>,
    conversations: Arc<ConversationManager>,
}

impl MemorySubstrate {
    /// Open a file-backed substrate rooted at `data_dir`, creating the layout.
    pub async fn open(data_dir: impl Into<PathBuf>, config: MemoryConfig) -> PhasegateResult<Self> {
        let store = FileStore::open(data_dir).await?;
        info!(root = %store.root().display(), "Memory substrate opened");
        Ok(Self::with_store(Arc::new(store), config))
    }

    /// Build a substrate over any [`RecordStore`].
    pub fn with_store(store: Arc<dyn RecordStore>, config: MemoryConfig) -> Self {
        let cache = Arc::new(MemoryCache::new(store));
        let conversations = Arc::new(ConversationManager::new(cache.clone(), config.clone()));
        let agents = Arc::new(AgentMemoryManager::new(
            cache.clone(),
            conversations.clone(),
            config,
        ));
        Self {
            cache,
            agents,
            conversations,
        }
    }

    pub fn agents(&self) -> &Arc<AgentMemoryManager> {
        &self.agents
    }

    pub fn conversations(&self) -> &Arc<ConversationManager> {
        &self.conversations
    }

    pub fn cache(&self) -> &Arc<MemoryCache> {
        &self.cache
    }
}
