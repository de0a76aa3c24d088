//! Static capability catalogs and persona text.
//!
//! Tools, resources and prompts are all derived from the fixed
//! [`AgentIdentity`] table plus a handful of management tools.

use phasegate_types::agent::AgentIdentity;
use phasegate_types::tool::ToolDefinition;
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::{debug, warn};

pub const TOOL_MEMORY_SUMMARY: &str = "agent_memory_summary";
pub const TOOL_CONVERSATION_HISTORY: &str = "agent_conversation_history";
pub const TOOL_START_SESSION: &str = "start_agent_session";
pub const TOOL_CLEANUP: &str = "cleanup_conversations";
pub const TOOL_EXECUTE_WORKFLOW: &str = "execute_workflow";

/// Suffix of per-agent prompt names.
const PROMPT_SUFFIX: &str = "_prompt";

/// Every tool the gateway answers to: one per agent, then management tools.
pub fn tool_definitions() -> Vec<ToolDefinition> {
    let mut tools: Vec<ToolDefinition> = AgentIdentity::ALL
        .iter()
        .map(|agent| ToolDefinition {
            name: agent.tool_name(),
            description: format!("Invoke the {} agent. {}.", agent.name(), agent.description()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "task": {"type": "string", "description": "What the agent should do"},
                    "context": {"description": "Additional context, free text or object"},
                    "sessionId": {"type": "string", "description": "Continue an active session"},
                    "rememberAs": {"type": "string", "description": "Record this note as a learning"}
                },
                "required": ["task"]
            }),
        })
        .collect();

    let agent_names: Vec<&str> = AgentIdentity::ALL.iter().map(|a| a.name()).collect();
    tools.push(ToolDefinition {
        name: TOOL_MEMORY_SUMMARY.to_string(),
        description: "Summarize an agent's persistent memory".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {"agent": {"type": "string", "enum": agent_names}},
            "required": ["agent"]
        }),
    });
    tools.push(ToolDefinition {
        name: TOOL_CONVERSATION_HISTORY.to_string(),
        description: "Recent messages of one agent conversation session".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "agent": {"type": "string", "enum": agent_names},
                "sessionId": {"type": "string"},
                "limit": {"type": "integer", "minimum": 1}
            },
            "required": ["agent", "sessionId"]
        }),
    });
    tools.push(ToolDefinition {
        name: TOOL_START_SESSION.to_string(),
        description: "Start a new conversation session with an agent".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "agent": {"type": "string", "enum": agent_names},
                "context": {"description": "Session context"}
            },
            "required": ["agent"]
        }),
    });
    tools.push(ToolDefinition {
        name: TOOL_CLEANUP.to_string(),
        description: "Delete conversation files older than the retention window".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {"retentionDays": {"type": "integer", "minimum": 0}}
        }),
    });
    tools.push(ToolDefinition {
        name: TOOL_EXECUTE_WORKFLOW.to_string(),
        description: "Run the phase-gated workflow from Requirements to Validation".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "description": {"type": "string"},
                "priority": {"type": "string", "enum": ["low", "medium", "high", "critical"]}
            },
            "required": ["description"]
        }),
    });
    tools
}

/// `resources/list` entries: one persona resource per agent.
pub fn resource_list() -> Vec<Value> {
    AgentIdentity::ALL
        .iter()
        .map(|agent| {
            json!({
                "uri": agent.resource_uri(),
                "name": format!("{} instructions", agent.name()),
                "description": agent.description(),
                "mimeType": "text/markdown",
            })
        })
        .collect()
}

/// `prompts/list` entries: one prompt per agent.
pub fn prompt_list() -> Vec<Value> {
    AgentIdentity::ALL
        .iter()
        .map(|agent| {
            json!({
                "name": prompt_name(*agent),
                "description": format!("Adopt the {} persona", agent.name()),
                "arguments": [],
            })
        })
        .collect()
}

pub fn prompt_name(agent: AgentIdentity) -> String {
    format!("{}{PROMPT_SUFFIX}", agent.slug())
}

/// Resolve `agent://<identity>`.
pub fn agent_from_uri(uri: &str) -> Option<AgentIdentity> {
    uri.strip_prefix("agent://").and_then(|s| s.parse().ok())
}

/// Resolve `<identity>_prompt`.
pub fn agent_from_prompt(name: &str) -> Option<AgentIdentity> {
    name.strip_suffix(PROMPT_SUFFIX).and_then(|s| s.parse().ok())
}

/// Persona text source: `<dir>/<Identity>.md` when present, else built-in.
#[derive(Debug, Clone, Default)]
pub struct PersonaLibrary {
    dir: Option<PathBuf>,
}

impl PersonaLibrary {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    /// Persona text for `agent`. Treated as opaque.
    pub async fn instructions(&self, agent: AgentIdentity) -> String {
        if let Some(dir) = &self.dir {
            let path = dir.join(format!("{}.md", agent.name()));
            match tokio::fs::read_to_string(&path).await {
                Ok(text) => return text,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!(path = %path.display(), "No persona file, using built-in");
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to read persona file");
                }
            }
        }
        agent.default_instructions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_catalog() {
        let tools = tool_definitions();
        assert_eq!(tools.len(), AgentIdentity::ALL.len() + 5);
        assert_eq!(tools[0].name, "agent_project_manager");
        assert!(tools.iter().any(|t| t.name == TOOL_START_SESSION));
        for tool in &tools {
            assert_eq!(tool.input_schema["type"], "object");
        }
    }

    #[test]
    fn test_uri_and_prompt_resolution() {
        assert_eq!(
            agent_from_uri("agent://qa_engineer"),
            Some(AgentIdentity::QAEngineer)
        );
        assert_eq!(agent_from_uri("file://qa_engineer"), None);
        assert_eq!(
            agent_from_prompt(&prompt_name(AgentIdentity::Architect)),
            Some(AgentIdentity::Architect)
        );
        assert_eq!(agent_from_prompt("architect"), None);
    }

    #[tokio::test]
    async fn test_persona_override() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Architect.md"), "# Architect\nDraw boxes.").unwrap();
        let library = PersonaLibrary::new(Some(dir.path().to_path_buf()));

        let architect = library.instructions(AgentIdentity::Architect).await;
        assert!(architect.contains("Draw boxes."));
        let implementer = library.instructions(AgentIdentity::Implementer).await;
        assert_eq!(implementer, AgentIdentity::Implementer.default_instructions());
    }
}
