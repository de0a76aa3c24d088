//! The fixed table of agent identities.
//!
//! Every agent known to the system is one of these identities. Memory and
//! conversation records are keyed by [`AgentIdentity::name`], which is also
//! the stem of the agent's memory file.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PhasegateError;

/// A named agent identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AgentIdentity {
    ProjectManager,
    Architect,
    SecurityEngineer,
    QAEngineer,
    Implementer,
}

impl AgentIdentity {
    /// All identities, in catalog order.
    pub const ALL: [AgentIdentity; 5] = [
        AgentIdentity::ProjectManager,
        AgentIdentity::Architect,
        AgentIdentity::SecurityEngineer,
        AgentIdentity::QAEngineer,
        AgentIdentity::Implementer,
    ];

    /// Canonical name, used as the storage key.
    pub fn name(self) -> &'static str {
        match self {
            AgentIdentity::ProjectManager => "ProjectManager",
            AgentIdentity::Architect => "Architect",
            AgentIdentity::SecurityEngineer => "SecurityEngineer",
            AgentIdentity::QAEngineer => "QAEngineer",
            AgentIdentity::Implementer => "Implementer",
        }
    }

    /// Lowercase snake-case slug used in tool names and resource URIs.
    pub fn slug(self) -> &'static str {
        match self {
            AgentIdentity::ProjectManager => "project_manager",
            AgentIdentity::Architect => "architect",
            AgentIdentity::SecurityEngineer => "security_engineer",
            AgentIdentity::QAEngineer => "qa_engineer",
            AgentIdentity::Implementer => "implementer",
        }
    }

    /// One-line role description shown in capability catalogs.
    pub fn description(self) -> &'static str {
        match self {
            AgentIdentity::ProjectManager => {
                "Captures requirements, scope and acceptance goals, and coordinates hand-offs"
            }
            AgentIdentity::Architect => "Designs system structure, interfaces and data flow",
            AgentIdentity::SecurityEngineer => {
                "Reviews designs for threats and defines security controls"
            }
            AgentIdentity::QAEngineer => {
                "Defines acceptance criteria and validates the finished implementation"
            }
            AgentIdentity::Implementer => "Builds the design against the agreed criteria",
        }
    }

    /// Built-in persona text used when no persona file overrides it.
    pub fn default_instructions(self) -> String {
        format!(
            "You are the {} agent. {}. Stay within your role, record durable \
             insights as learnings, and hand off explicitly to the next phase owner.",
            self.name(),
            self.description()
        )
    }

    /// Tool name under which this identity is invocable.
    pub fn tool_name(self) -> String {
        format!("agent_{}", self.slug())
    }

    /// Resource URI for this identity's persona text.
    pub fn resource_uri(self) -> String {
        format!("agent://{}", self.slug())
    }

    /// Resolve an identity from a tool name of the form `agent_<identity>`.
    pub fn from_tool_name(tool: &str) -> Option<Self> {
        tool.strip_prefix("agent_").and_then(|s| s.parse().ok())
    }
}

impl fmt::Display for AgentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AgentIdentity {
    type Err = PhasegateError;

    /// Accepts the canonical name or the slug, case-insensitively, with or
    /// without separators (`QAEngineer`, `qa_engineer`, `qa-engineer`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-' && *c != ' ')
            .collect::<String>()
            .to_lowercase();
        AgentIdentity::ALL
            .into_iter()
            .find(|a| a.name().to_lowercase() == folded)
            .ok_or_else(|| PhasegateError::UnknownAgent(s.to_string()))
    }
}

/// Validate a free-form agent name for use as a storage key.
///
/// Names become file stems, so separators and parent references are refused.
pub fn validate_agent_name(name: &str) -> Result<(), PhasegateError> {
    validate_key("agent name", name)
}

/// Validate a session id for use in a file name.
pub fn validate_session_id(session_id: &str) -> Result<(), PhasegateError> {
    validate_key("session id", session_id)
}

fn validate_key(label: &str, key: &str) -> Result<(), PhasegateError> {
    if key.is_empty()
        || key.contains('/')
        || key.contains('\\')
        || key.contains("..")
        || key.chars().any(char::is_control)
    {
        return Err(PhasegateError::InvalidInput(format!(
            "invalid {label}: {key:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_identity_variants() {
        assert_eq!(
            "QAEngineer".parse::<AgentIdentity>().unwrap(),
            AgentIdentity::QAEngineer
        );
        assert_eq!(
            "qa_engineer".parse::<AgentIdentity>().unwrap(),
            AgentIdentity::QAEngineer
        );
        assert_eq!(
            "project-manager".parse::<AgentIdentity>().unwrap(),
            AgentIdentity::ProjectManager
        );
        assert!("Marketing".parse::<AgentIdentity>().is_err());
    }

    #[test]
    fn test_tool_name_round_trip() {
        for agent in AgentIdentity::ALL {
            assert_eq!(AgentIdentity::from_tool_name(&agent.tool_name()), Some(agent));
        }
        assert_eq!(AgentIdentity::from_tool_name("architect"), None);
        assert_eq!(AgentIdentity::from_tool_name("agent_nobody"), None);
    }

    #[test]
    fn test_resource_uri() {
        assert_eq!(
            AgentIdentity::SecurityEngineer.resource_uri(),
            "agent://security_engineer"
        );
    }

    #[test]
    fn test_validate_agent_name() {
        assert!(validate_agent_name("Architect").is_ok());
        assert!(validate_agent_name("").is_err());
        assert!(validate_agent_name("../etc").is_err());
        assert!(validate_agent_name("a/b").is_err());
        assert!(validate_session_id("Architect-1a2b3c4d").is_ok());
        assert!(validate_session_id("x\\y").is_err());
    }
}
