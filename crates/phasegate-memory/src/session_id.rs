//! Session identifier generation.
//!
//! Ids have the shape `{agent}-{hash8}`, where `hash8` is eight lowercase hex
//! characters taken from a SHA-256 over the agent, the user, the current time
//! and a random UUID. The random component keeps ids distinct even when two
//! are minted in the same clock tick; callers still check for an existing
//! record before using one.

use chrono::Utc;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// User id assumed when none is supplied.
pub const DEFAULT_USER: &str = "default";

/// Mint a candidate session id for `agent`.
pub fn generate_session_id(agent: &str, user_id: &str) -> String {
    let now = Utc::now();
    let mut hasher = Sha256::new();
    hasher.update(agent.as_bytes());
    hasher.update([0u8]);
    hasher.update(user_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(now.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
    hasher.update(Uuid::new_v4().as_bytes());
    let digest = hasher.finalize();
    format!("{agent}-{}", hex::encode(&digest[..4]))
}

/// Whether `id` looks like an id minted for `agent`.
pub fn is_session_id_for(agent: &str, id: &str) -> bool {
    id.strip_prefix(agent)
        .and_then(|rest| rest.strip_prefix('-'))
        .is_some_and(|hash| {
            hash.len() == 8 && hash.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f'))
        })
}
