//! Configuration types. Loading lives in `phasegate-kernel`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable overriding the Phasegate home directory.
pub const HOME_ENV: &str = "PHASEGATE_HOME";

/// Top-level configuration, read from `config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhasegateConfig {
    /// Home directory holding the config file and default data directory.
    pub home_dir: PathBuf,
    /// Storage root for `context/`, `conversations/` and reserved dirs.
    pub data_dir: PathBuf,
    /// Log filter used when `RUST_LOG` is unset.
    pub log_level: String,
    pub memory: MemoryConfig,
    pub retention: RetentionConfig,
    pub gateway: GatewayConfig,
}

impl Default for PhasegateConfig {
    fn default() -> Self {
        let home_dir = phasegate_home();
        Self {
            data_dir: home_dir.join("memory"),
            home_dir,
            log_level: "info".to_string(),
            memory: MemoryConfig::default(),
            retention: RetentionConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

impl PhasegateConfig {
    /// Defaults rooted at `data_dir`, for tests and embedded use.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }
}

/// Capacities and read windows of the memory substrate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Maximum retained learnings per agent; oldest evicted first.
    pub learning_capacity: usize,
    /// Maximum collaboration history entries per relationship.
    pub collaboration_history_capacity: usize,
    /// Learnings included in a context projection.
    pub context_learnings: usize,
    /// Conversation messages included in a context projection.
    pub context_messages: usize,
    /// Default `limit` for history queries.
    pub default_history_limit: usize,
    /// Default `limit` for recent-session discovery.
    pub recent_sessions_limit: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            learning_capacity: 100,
            collaboration_history_capacity: 20,
            context_learnings: 5,
            context_messages: 10,
            default_history_limit: 50,
            recent_sessions_limit: 10,
        }
    }
}

/// Conversation retention sweep settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub conversation_retention_days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            conversation_retention_days: 30,
        }
    }
}

/// Session gateway settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Soft limit the duration warnings are measured against.
    pub session_limit_minutes: u64,
    /// Elapsed time after which the session clock is considered stale.
    pub stale_reset_hours: u64,
    /// Longest duration counted before the clock is reset.
    pub max_session_hours: u64,
    /// Conversation messages returned with each agent invocation.
    pub history_window: usize,
    /// Directory of `<Identity>.md` persona files overriding built-ins.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub personas_dir: Option<PathBuf>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            session_limit_minutes: 120,
            stale_reset_hours: 6,
            max_session_hours: 4,
            history_window: 5,
            personas_dir: None,
        }
    }
}

/// The Phasegate home directory: `$PHASEGATE_HOME`, else `~/.phasegate`.
pub fn phasegate_home() -> PathBuf {
    if let Some(home) = std::env::var_os(HOME_ENV) {
        return PathBuf::from(home);
    }
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".phasegate")
}
