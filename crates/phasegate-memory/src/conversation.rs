//! Conversation session lifecycle.

use chrono::Utc;
use phasegate_types::agent::{validate_agent_name, validate_session_id};
use phasegate_types::config::MemoryConfig;
use phasegate_types::conversation::{
    AppendResult, ConversationMessage, ConversationSession, NewMessage, SessionResolution,
    SessionStatus, SessionSummary, StartedSession,
};
use phasegate_types::error::{PhasegateError, PhasegateResult};
use phasegate_types::memory::SaveOutcome;
use serde_json::Value;
use std::cmp::Reverse;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::MemoryCache;
use crate::locks::KeyedLocks;
use crate::session_id::{generate_session_id, DEFAULT_USER};

/// Attempts at minting an unused session id before giving up.
const MAX_ID_ATTEMPTS: usize = 16;

/// Owns session creation, appends and history queries.
pub struct ConversationManager {
    cache: Arc<MemoryCache>,
    locks: KeyedLocks,
    config: MemoryConfig,
}

impl ConversationManager {
    pub fn new(cache: Arc<MemoryCache>, config: MemoryConfig) -> Self {
        Self {
            cache,
            locks: KeyedLocks::new(),
            config,
        }
    }

    /// Mint a session id for `agent` that no cached or stored session uses.
    pub async fn generate_session_id(
        &self,
        agent: &str,
        user_id: Option<&str>,
    ) -> PhasegateResult<String> {
        validate_agent_name(agent)?;
        let user = user_id.unwrap_or(DEFAULT_USER);
        for _ in 0..MAX_ID_ATTEMPTS {
            let candidate = generate_session_id(agent, user);
            if !self.cache.has_session(&candidate)
                && !self.cache.store().session_exists(agent, &candidate).await
            {
                return Ok(candidate);
            }
            warn!(agent, session_id = %candidate, "Session id collision, regenerating");
        }
        Err(PhasegateError::Internal(format!(
            "could not mint an unused session id for {agent}"
        )))
    }

    /// Create and persist a new active session. Generates an id if none given.
    pub async fn start_conversation(
        &self,
        agent: &str,
        session_id: Option<&str>,
        context: Value,
    ) -> PhasegateResult<StartedSession> {
        validate_agent_name(agent)?;
        let session_id = match session_id {
            Some(id) => {
                validate_session_id(id)?;
                id.to_string()
            }
            None => self.generate_session_id(agent, None).await?,
        };
        let session = ConversationSession::new(agent, &session_id, context);
        let outcome = self.cache.put_session(&session).await;
        info!(agent, session_id = %session_id, "Conversation started");
        Ok(StartedSession {
            session_id,
            outcome,
        })
    }

    /// Append a message to a session.
    ///
    /// If the session is neither cached nor stored, a fresh session is started
    /// under a newly generated id and the message lands there; the result's
    /// `resolution` is then [`SessionResolution::Created`] and `session_id` is
    /// the new id.
    pub async fn add_to_conversation(
        &self,
        session_id: &str,
        message: NewMessage,
        agent: &str,
    ) -> PhasegateResult<AppendResult> {
        validate_agent_name(agent)?;
        let _guard = self.locks.lock(session_id).await;

        let existing = if validate_session_id(session_id).is_ok() {
            self.cache.get_session(agent, session_id).await
        } else {
            None
        };
        let (mut session, resolution, start_outcome) = match existing {
            Some(s) => (s, SessionResolution::Existing, SaveOutcome::Persisted),
            None => {
                debug!(agent, session_id, "Unknown session, starting a new one");
                let started = self.start_conversation(agent, None, Value::Null).await?;
                let session = self
                    .cache
                    .get_session(agent, &started.session_id)
                    .await
                    .ok_or_else(|| {
                        PhasegateError::Internal("new session vanished from cache".to_string())
                    })?;
                (session, SessionResolution::Created, started.outcome)
            }
        };

        let now = Utc::now();
        let message_id = Uuid::new_v4().to_string();
        session.messages.push(ConversationMessage {
            id: message_id.clone(),
            timestamp: now,
            message_type: message.message_type,
            content: message.content,
            metadata: message.metadata,
            agent_response: message.agent_response,
        });
        session.last_activity = now;
        let outcome = start_outcome.and(self.cache.put_session(&session).await);

        Ok(AppendResult {
            session_id: session.session_id,
            resolution,
            message_id,
            outcome,
        })
    }

    /// The last `limit` messages of a session, oldest first.
    ///
    /// Unknown sessions yield an empty list.
    pub async fn get_conversation_history(
        &self,
        session_id: &str,
        agent: &str,
        limit: Option<usize>,
    ) -> Vec<ConversationMessage> {
        let limit = limit.unwrap_or(self.config.default_history_limit);
        match self.cache.get_session(agent, session_id).await {
            Some(session) => {
                let skip = session.messages.len().saturating_sub(limit);
                session.messages.into_iter().skip(skip).collect()
            }
            None => Vec::new(),
        }
    }

    /// A full session record, if known.
    pub async fn get_session(&self, session_id: &str, agent: &str) -> Option<ConversationSession> {
        self.cache.get_session(agent, session_id).await
    }

    /// Set a session's status.
    pub async fn set_status(
        &self,
        session_id: &str,
        agent: &str,
        status: SessionStatus,
    ) -> PhasegateResult<SaveOutcome> {
        let _guard = self.locks.lock(session_id).await;
        let mut session = self
            .cache
            .get_session(agent, session_id)
            .await
            .ok_or_else(|| PhasegateError::UnknownSession(session_id.to_string()))?;
        session.status = status;
        session.last_activity = Utc::now();
        Ok(self.cache.put_session(&session).await)
    }

    /// Summaries of `agent`'s sessions, most recently modified first.
    pub async fn get_recent_conversations(
        &self,
        agent: &str,
        limit: Option<usize>,
    ) -> PhasegateResult<Vec<SessionSummary>> {
        validate_agent_name(agent)?;
        let limit = limit.unwrap_or(self.config.recent_sessions_limit);
        let mut files = self.cache.store().list_sessions(agent).await?;
        files.sort_by_key(|f| Reverse(f.modified));

        let mut summaries = Vec::with_capacity(limit.min(files.len()));
        for file in files.into_iter().take(limit) {
            match self.cache.get_session(agent, &file.session_id).await {
                Some(session) => summaries.push(session.summary()),
                None => {
                    warn!(agent, session_id = %file.session_id, "Skipping unreadable session");
                }
            }
        }
        Ok(summaries)
    }
}
