//! JSON-RPC request handling.
//!
//! Every request yields exactly one response envelope except notifications,
//! which yield none. Failures never escape as panics or transport errors:
//! unparseable input is answered with `-32700`, every other failure with
//! `-32603` and a readable message.

use chrono::Utc;
use dashmap::DashMap;
use phasegate_kernel::workflow::Priority;
use phasegate_kernel::PhasegateKernel;
use phasegate_types::agent::AgentIdentity;
use phasegate_types::conversation::{NewMessage, SessionResolution};
use phasegate_types::error::{PhasegateError, PhasegateResult};
use phasegate_types::memory::{NewLearning, SaveOutcome};
use serde_json::{json, Value};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::catalog::{
    self, PersonaLibrary, TOOL_CLEANUP, TOOL_CONVERSATION_HISTORY, TOOL_EXECUTE_WORKFLOW,
    TOOL_MEMORY_SUMMARY, TOOL_START_SESSION,
};
use crate::clock::SessionClock;

/// MCP protocol version supported by this server.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC parse error.
pub const PARSE_ERROR: i64 = -32700;
/// JSON-RPC internal error, used for every non-parse failure.
pub const INTERNAL_ERROR: i64 = -32603;

/// Learning type for notes a caller asks an agent to remember.
const USER_INSTRUCTION: &str = "user_instruction";

/// Maps protocol methods onto the kernel.
pub struct SessionGateway {
    kernel: Arc<PhasegateKernel>,
    personas: PersonaLibrary,
    clock: SessionClock,
    /// Sessions started or continued through this gateway: session id to agent.
    active_sessions: DashMap<String, String>,
}

impl SessionGateway {
    pub fn new(kernel: Arc<PhasegateKernel>) -> Self {
        let personas = PersonaLibrary::new(kernel.config.gateway.personas_dir.clone());
        let clock = SessionClock::new(&kernel.config.gateway, Utc::now());
        Self {
            kernel,
            personas,
            clock,
            active_sessions: DashMap::new(),
        }
    }

    /// Whether `session_id` is tracked as active.
    pub fn is_active(&self, session_id: &str) -> bool {
        self.active_sessions.contains_key(session_id)
    }

    /// Handle one transport line. Blank lines produce nothing.
    pub async fn handle_line(&self, line: &str) -> Option<Value> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let request: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Unparseable request line");
                return Some(parse_error(&PhasegateError::Parse(e.to_string()).to_string()));
            }
        };
        if !request.get("method").is_some_and(Value::is_string) {
            let err = PhasegateError::Parse("request has no method".to_string());
            return Some(make_error(
                request.get("id").cloned(),
                PARSE_ERROR,
                &err.to_string(),
            ));
        }
        self.handle_request(&request).await
    }

    /// Handle a decoded request envelope.
    pub async fn handle_request(&self, request: &Value) -> Option<Value> {
        let method = request["method"].as_str().unwrap_or("");
        let id = request.get("id").cloned();
        let params = request.get("params").cloned().unwrap_or_else(|| json!({}));
        debug!(method, "Gateway request");

        if method.starts_with("notifications/") {
            return None;
        }

        let result = match method {
            "initialize" => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": {},
                    "resources": {},
                    "prompts": {}
                },
                "serverInfo": {
                    "name": "phasegate",
                    "version": env!("CARGO_PKG_VERSION")
                }
            })),
            "ping" => Ok(json!({})),
            "tools/list" => {
                let tools: Vec<Value> = catalog::tool_definitions()
                    .into_iter()
                    .map(|t| {
                        json!({
                            "name": t.name,
                            "description": t.description,
                            "inputSchema": t.input_schema,
                        })
                    })
                    .collect();
                Ok(json!({ "tools": tools }))
            }
            "resources/list" => Ok(json!({ "resources": catalog::resource_list() })),
            "resources/read" => self.read_resource(&params).await,
            "prompts/list" => Ok(json!({ "prompts": catalog::prompt_list() })),
            "prompts/get" => self.get_prompt(&params).await,
            "tools/call" => {
                let name = params["name"].as_str().unwrap_or("");
                let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
                self.call_tool(name, &arguments).await
            }
            other => Err(PhasegateError::UnknownMethod(other.to_string())),
        };

        Some(match result {
            Ok(value) => make_response(id, value),
            Err(e) => {
                warn!(method, error = %e, "Gateway request failed");
                make_error(id, INTERNAL_ERROR, &e.to_string())
            }
        })
    }

    async fn read_resource(&self, params: &Value) -> PhasegateResult<Value> {
        let uri = params["uri"].as_str().unwrap_or("");
        let agent = catalog::agent_from_uri(uri)
            .ok_or_else(|| PhasegateError::InvalidInput(format!("Unknown resource: {uri}")))?;
        let text = self.personas.instructions(agent).await;
        Ok(json!({
            "contents": [{
                "uri": uri,
                "mimeType": "text/markdown",
                "text": text,
            }]
        }))
    }

    async fn get_prompt(&self, params: &Value) -> PhasegateResult<Value> {
        let name = params["name"].as_str().unwrap_or("");
        let agent = catalog::agent_from_prompt(name)
            .ok_or_else(|| PhasegateError::InvalidInput(format!("Unknown prompt: {name}")))?;
        let text = self.personas.instructions(agent).await;
        Ok(json!({
            "description": format!("Adopt the {} persona", agent.name()),
            "messages": [{
                "role": "user",
                "content": {"type": "text", "text": text}
            }]
        }))
    }

    async fn call_tool(&self, name: &str, args: &Value) -> PhasegateResult<Value> {
        if let Some(agent) = AgentIdentity::from_tool_name(name) {
            return self.invoke_agent(agent, args).await;
        }
        match name {
            TOOL_MEMORY_SUMMARY => self.memory_summary(args).await,
            TOOL_CONVERSATION_HISTORY => self.conversation_history(args).await,
            TOOL_START_SESSION => self.start_session(args).await,
            TOOL_CLEANUP => self.cleanup(args).await,
            TOOL_EXECUTE_WORKFLOW => self.execute_workflow(args).await,
            _ if name.starts_with("agent_") => Err(PhasegateError::UnknownAgent(
                name.trim_start_matches("agent_").to_string(),
            )),
            _ => Err(PhasegateError::UnknownTool(name.to_string())),
        }
    }

    async fn invoke_agent(&self, agent: AgentIdentity, args: &Value) -> PhasegateResult<Value> {
        let task = required_str(args, "task")?;
        let extra_context = args.get("context").cloned().unwrap_or(Value::Null);
        let requested = args["sessionId"].as_str();
        let agent_name = agent.name();
        let clock = self.clock.observe(Utc::now());
        let memory = &self.kernel.memory;
        let mut outcome = SaveOutcome::Persisted;

        let tracked = requested.filter(|id| {
            self.active_sessions
                .get(*id)
                .is_some_and(|owner| owner.value() == agent_name)
        });
        let (mut session_id, mut new_session) = match tracked {
            Some(id) => (id.to_string(), false),
            None => {
                let started = memory
                    .conversations()
                    .start_conversation(
                        agent_name,
                        None,
                        json!({
                            "taskType": "agent_invocation",
                            "task": task,
                            "context": extra_context,
                        }),
                    )
                    .await?;
                outcome = outcome.and(started.outcome);
                (started.session_id, true)
            }
        };

        let context = memory
            .agents()
            .get_agent_context(agent_name, None, false)
            .await?;
        let history = memory
            .conversations()
            .get_conversation_history(
                &session_id,
                agent_name,
                Some(self.kernel.config.gateway.history_window),
            )
            .await;

        let appended = memory
            .conversations()
            .add_to_conversation(
                &session_id,
                NewMessage::new("task", task).with_metadata(json!({ "context": extra_context })),
                agent_name,
            )
            .await?;
        outcome = outcome.and(appended.outcome);
        if appended.resolution == SessionResolution::Created {
            self.active_sessions.remove(&session_id);
            session_id = appended.session_id;
            new_session = true;
        }
        self.active_sessions
            .insert(session_id.clone(), agent_name.to_string());

        let remembered = match args["rememberAs"].as_str().filter(|s| !s.is_empty()) {
            Some(note) => {
                let learning = NewLearning::new(note)
                    .with_type(USER_INSTRUCTION)
                    .with_context(json!({ "task": task, "sessionId": session_id }));
                let (learning, saved) = memory.agents().add_learning(agent_name, learning).await?;
                outcome = outcome.and(saved);
                Some(learning)
            }
            None => None,
        };

        info!(agent = agent_name, session_id = %session_id, new_session, "Agent invoked");

        let persona = self.personas.instructions(agent).await;
        let mut text = String::new();
        let _ = writeln!(text, "{persona}\n");
        let _ = writeln!(text, "## Task\n{task}\n");
        if !extra_context.is_null() {
            let _ = writeln!(text, "## Context\n{}\n", render_value(&extra_context));
        }
        let _ = writeln!(
            text,
            "## Memory\n{} interactions, {} recent learnings, {} pending reminders, {} relationships\n",
            context.metrics.total_interactions,
            context.recent_learnings.len(),
            context.pending_reminders.len(),
            context.relationships.len()
        );
        for learning in &context.recent_learnings {
            let _ = writeln!(text, "- [{}] {}", learning.learning_type, learning.content);
        }
        if !history.is_empty() {
            let _ = writeln!(text, "\n## Recent conversation");
            for message in &history {
                let _ = writeln!(text, "- ({}) {}", message.message_type, message.content);
            }
        }
        let _ = writeln!(text, "\nSession: {session_id}\n{}", clock.warning);

        let mut data = json!({
            "agent": agent_name,
            "sessionId": session_id,
            "newSession": new_session,
            "context": context,
            "recentHistory": history,
            "sessionClock": clock,
        });
        if let Some(learning) = remembered {
            data["rememberedLearning"] = json!(learning);
        }
        Ok(tool_result(text, data, &outcome))
    }

    async fn memory_summary(&self, args: &Value) -> PhasegateResult<Value> {
        let agent: AgentIdentity = required_str(args, "agent")?.parse()?;
        let summary = self
            .kernel
            .memory
            .agents()
            .get_memory_summary(agent.name())
            .await?;
        let text = format!(
            "{}: {} interactions, {} learnings, {} incomplete reminders, {} relationships, {} recent conversations",
            summary.agent,
            summary.total_interactions,
            summary.learnings,
            summary.incomplete_reminders,
            summary.relationships,
            summary.recent_conversations
        );
        Ok(tool_result(text, json!(summary), &SaveOutcome::Persisted))
    }

    async fn conversation_history(&self, args: &Value) -> PhasegateResult<Value> {
        let agent: AgentIdentity = required_str(args, "agent")?.parse()?;
        let session_id = required_str(args, "sessionId")?;
        let limit: Option<usize> = optional_uint(args, "limit")?;
        let messages = self
            .kernel
            .memory
            .conversations()
            .get_conversation_history(session_id, agent.name(), limit)
            .await;
        let mut text = format!("{} messages in {session_id}", messages.len());
        for message in &messages {
            let _ = write!(text, "\n- ({}) {}", message.message_type, message.content);
        }
        Ok(tool_result(
            text,
            json!({ "sessionId": session_id, "messages": messages }),
            &SaveOutcome::Persisted,
        ))
    }

    async fn start_session(&self, args: &Value) -> PhasegateResult<Value> {
        let agent: AgentIdentity = required_str(args, "agent")?.parse()?;
        let context = args.get("context").cloned().unwrap_or_else(|| json!({}));
        let started = self
            .kernel
            .memory
            .conversations()
            .start_conversation(agent.name(), None, context)
            .await?;
        self.active_sessions
            .insert(started.session_id.clone(), agent.name().to_string());
        Ok(tool_result(
            format!("Started session {} with {}", started.session_id, agent.name()),
            json!({ "agent": agent.name(), "sessionId": started.session_id }),
            &started.outcome,
        ))
    }

    async fn cleanup(&self, args: &Value) -> PhasegateResult<Value> {
        let days: Option<u32> = optional_uint(args, "retentionDays")?;
        let deleted = self
            .kernel
            .cleanup_old_data(days)
            .await
            .map_err(|e| PhasegateError::Internal(e.to_string()))?;
        // Swept sessions were evicted from the cache.
        let cache = self.kernel.memory.cache();
        self.active_sessions.retain(|id, _| cache.has_session(id));
        Ok(tool_result(
            format!("Deleted {deleted} expired conversation files"),
            json!({ "deleted": deleted }),
            &SaveOutcome::Persisted,
        ))
    }

    async fn execute_workflow(&self, args: &Value) -> PhasegateResult<Value> {
        let description = required_str(args, "description")?;
        let priority: Priority = match args["priority"].as_str() {
            Some(p) => p.parse()?,
            None => Priority::default(),
        };
        let workflow = self
            .kernel
            .workflows
            .execute_workflow(description, priority)
            .await
            .map_err(|e| PhasegateError::Internal(e.to_string()))?;
        let phases: Vec<&str> = workflow.phases.iter().map(|p| p.phase.name()).collect();
        let text = format!(
            "Workflow {} finished with status {:?} after {} phases: {}",
            workflow.id,
            workflow.status,
            phases.len(),
            phases.join(" -> ")
        );
        let outcome = match workflow.warnings.first() {
            Some(w) => SaveOutcome::CachedOnly { error: w.clone() },
            None => SaveOutcome::Persisted,
        };
        Ok(tool_result(text, json!(workflow), &outcome))
    }
}

fn required_str<'a>(args: &'a Value, key: &str) -> PhasegateResult<&'a str> {
    args[key]
        .as_str()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| PhasegateError::InvalidInput(format!("Missing required argument: {key}")))
}

/// An optional non-negative integer argument that must fit in `T`.
fn optional_uint<T: TryFrom<u64>>(args: &Value, key: &str) -> PhasegateResult<Option<T>> {
    match &args[key] {
        Value::Null => Ok(None),
        value => value
            .as_u64()
            .and_then(|n| T::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| PhasegateError::InvalidInput(format!("Invalid {key}: {value}"))),
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_default(),
    }
}

/// Build an MCP tool result with a text block and structured data.
fn tool_result(text: String, data: Value, outcome: &SaveOutcome) -> Value {
    let mut result = json!({
        "content": [{"type": "text", "text": text}],
        "data": data,
        "durable": outcome.is_durable(),
    });
    if let Some(warning) = outcome.warning() {
        result["warning"] = json!(warning);
    }
    result
}

/// Build a JSON-RPC 2.0 success response.
fn make_response(id: Option<Value>, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result,
    })
}

/// Build a JSON-RPC 2.0 error response.
fn make_error(id: Option<Value>, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": code,
            "message": message,
        },
    })
}

/// A `-32700` response for input that never became a request.
pub fn parse_error(message: &str) -> Value {
    make_error(None, PARSE_ERROR, message)
}
