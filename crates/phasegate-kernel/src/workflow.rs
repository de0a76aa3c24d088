//! Phase-gated workflow coordination.
//!
//! A workflow walks a fixed phase sequence, each phase owned by exactly one
//! agent identity:
//!
//! | # | Phase          | Owner            |
//! |---|----------------|------------------|
//! | 0 | Requirements   | ProjectManager   |
//! | 1 | Architecture   | Architect        |
//! | 2 | Security       | SecurityEngineer |
//! | 3 | QA             | QAEngineer       |
//! | 4 | Implementation | Implementer      |
//! | 5 | Validation     | QAEngineer       |
//!
//! QAEngineer owns both the criteria phase and the final validation, and
//! reuses one conversation session for both.
//!
//! Phases run strictly in order. Each phase appends a `phase_execution`
//! message to its owner's session, hands the work to a [`PhaseRequest`]
//! handler, records a `workflow_handoff` from the owner to the previous
//! phase's owner, and marks the owner's workflow state `phase_completed`.
//! A handler error leaves the instance `Failed` with its completed phases
//! intact. Instances live in process memory only.

use chrono::{DateTime, Utc};
use phasegate_memory::MemorySubstrate;
use phasegate_types::agent::AgentIdentity;
use phasegate_types::conversation::{NewMessage, SessionResolution, SessionStatus};
use phasegate_types::error::PhasegateError;
use phasegate_types::memory::{AgentContext, NewLearning, SaveOutcome};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{KernelError, KernelResult};

/// Interaction type recorded between consecutive phase owners.
pub const HANDOFF_INTERACTION: &str = "workflow_handoff";
/// Learning type recorded against ProjectManager when a workflow completes.
pub const COMPLETION_LEARNING: &str = "workflow_completion";

/// A named workflow phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Requirements,
    Architecture,
    Security,
    QA,
    Implementation,
    Validation,
}

/// The fixed phase order.
pub const PHASE_SEQUENCE: [Phase; 6] = [
    Phase::Requirements,
    Phase::Architecture,
    Phase::Security,
    Phase::QA,
    Phase::Implementation,
    Phase::Validation,
];

impl Phase {
    pub fn name(self) -> &'static str {
        match self {
            Phase::Requirements => "Requirements",
            Phase::Architecture => "Architecture",
            Phase::Security => "Security",
            Phase::QA => "QA",
            Phase::Implementation => "Implementation",
            Phase::Validation => "Validation",
        }
    }

    /// The agent identity responsible for this phase.
    pub fn owner(self) -> AgentIdentity {
        match self {
            Phase::Requirements => AgentIdentity::ProjectManager,
            Phase::Architecture => AgentIdentity::Architect,
            Phase::Security => AgentIdentity::SecurityEngineer,
            Phase::QA | Phase::Validation => AgentIdentity::QAEngineer,
            Phase::Implementation => AgentIdentity::Implementer,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Workflow priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = PhasegateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" | "normal" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            other => Err(PhasegateError::InvalidInput(format!(
                "unknown priority: {other}"
            ))),
        }
    }
}

/// Unique identifier for a workflow instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowId(pub Uuid);

impl WorkflowId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkflowId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a workflow instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WorkflowStatus {
    Active,
    /// A phase reported it cannot proceed. Terminal.
    Blocked { phase_index: usize, reason: String },
    Completed,
    /// A phase raised an error. Terminal; no rollback.
    Failed { phase_index: usize, cause: String },
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkflowStatus::Active)
    }
}

/// Status recorded for one executed phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Completed,
    Blocked,
}

/// What a phase handler decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseOutcome {
    Completed,
    Blocked { reason: String },
}

/// Everything a phase handler gets to work with.
#[derive(Debug, Clone)]
pub struct PhaseRequest {
    pub workflow_id: WorkflowId,
    pub description: String,
    pub priority: Priority,
    pub phase: Phase,
    pub phase_index: usize,
    pub agent: AgentIdentity,
    pub session_id: String,
    /// Owner's context, relationships restricted to workflow participants.
    pub context: AgentContext,
}

/// The handler used by [`WorkflowCoordinator::execute_workflow`]: every
/// phase completes immediately.
pub async fn complete_phase(_request: PhaseRequest) -> Result<PhaseOutcome, String> {
    Ok(PhaseOutcome::Completed)
}

/// Record of one executed phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseResult {
    pub phase: Phase,
    pub agent: String,
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub context_snapshot: AgentContext,
    pub status: PhaseStatus,
}

/// A workflow in flight or finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowInstance {
    pub id: WorkflowId,
    pub description: String,
    pub priority: Priority,
    pub status: WorkflowStatus,
    pub phase_sequence: Vec<Phase>,
    /// Executed phases, in order. `current_phase == phases.len()` between calls.
    pub phases: Vec<PhaseResult>,
    pub current_phase: usize,
    /// Agent name to session id, fixed at start.
    pub agent_sessions: BTreeMap<String, String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Writes that reached the cache but not disk.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl WorkflowInstance {
    /// Names of the distinct agents taking part.
    pub fn participants(&self) -> Vec<String> {
        self.agent_sessions.keys().cloned().collect()
    }

    fn note(&mut self, outcome: SaveOutcome) {
        if let Some(w) = outcome.warning() {
            self.warnings.push(w);
        }
    }
}

/// Drives phase-gated workflows over the memory substrate.
pub struct WorkflowCoordinator {
    memory: MemorySubstrate,
    /// Active and finished instances.
    workflows: Arc<RwLock<HashMap<WorkflowId, WorkflowInstance>>>,
}

impl WorkflowCoordinator {
    /// Maximum number of retained workflow instances. Oldest terminal
    /// instances are evicted when this limit is exceeded.
    const MAX_RETAINED_WORKFLOWS: usize = 200;

    pub fn new(memory: MemorySubstrate) -> Self {
        Self {
            memory,
            workflows: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Open one session per distinct phase owner and mark each owner's
    /// workflow state `initialized`.
    pub async fn start_workflow(
        &self,
        description: &str,
        priority: Priority,
    ) -> KernelResult<WorkflowInstance> {
        let id = WorkflowId::new();
        let mut workflow = WorkflowInstance {
            id,
            description: description.to_string(),
            priority,
            status: WorkflowStatus::Active,
            phase_sequence: PHASE_SEQUENCE.to_vec(),
            phases: Vec::new(),
            current_phase: 0,
            agent_sessions: BTreeMap::new(),
            started_at: Utc::now(),
            completed_at: None,
            warnings: Vec::new(),
        };

        let mut owners: Vec<(AgentIdentity, Phase)> = Vec::new();
        for phase in PHASE_SEQUENCE {
            if !owners.iter().any(|(a, _)| *a == phase.owner()) {
                owners.push((phase.owner(), phase));
            }
        }
        let related: Vec<&str> = owners.iter().map(|(a, _)| a.name()).collect();

        for (agent, first_phase) in &owners {
            let context = json!({
                "workflowId": id,
                "description": description,
                "taskType": "workflow",
                "priority": priority.as_str(),
                "relatedAgents": related,
                "workflowPhase": first_phase.name(),
            });
            let started = self
                .memory
                .conversations()
                .start_conversation(agent.name(), None, context)
                .await?;
            workflow.note(started.outcome);
            workflow
                .agent_sessions
                .insert(agent.name().to_string(), started.session_id);

            let outcome = self
                .memory
                .agents()
                .update_workflow_state(
                    agent.name(),
                    &id.to_string(),
                    "initialized",
                    json!({ "description": description, "priority": priority.as_str() }),
                )
                .await?;
            workflow.note(outcome);
        }

        info!(
            workflow_id = %id,
            priority = %priority,
            agents = workflow.agent_sessions.len(),
            "Workflow started"
        );
        self.retain(workflow.clone()).await;
        Ok(workflow)
    }

    /// Execute the phase at `phase_index` with the default handler.
    pub async fn execute_phase(
        &self,
        workflow: &mut WorkflowInstance,
        phase_index: usize,
    ) -> KernelResult<PhaseStatus> {
        self.execute_phase_with(workflow, phase_index, &complete_phase)
            .await
    }

    /// Execute the phase at `phase_index`, delegating the work to `handler`.
    ///
    /// `phase_index` must be the workflow's next phase and the workflow must
    /// be active. Any error after that point marks the workflow `Failed` and
    /// is returned as [`KernelError::PhaseFailed`].
    pub async fn execute_phase_with<F, Fut>(
        &self,
        workflow: &mut WorkflowInstance,
        phase_index: usize,
        handler: &F,
    ) -> KernelResult<PhaseStatus>
    where
        F: Fn(PhaseRequest) -> Fut,
        Fut: Future<Output = Result<PhaseOutcome, String>>,
    {
        if workflow.status.is_terminal() {
            return Err(PhasegateError::InvalidInput(format!(
                "workflow {} is no longer active",
                workflow.id
            ))
            .into());
        }
        if phase_index != workflow.current_phase {
            return Err(PhasegateError::InvalidInput(format!(
                "phase {phase_index} is out of order; next phase is {}",
                workflow.current_phase
            ))
            .into());
        }
        let Some(phase) = workflow.phase_sequence.get(phase_index).copied() else {
            return Err(PhasegateError::InvalidInput(format!(
                "phase index {phase_index} out of range"
            ))
            .into());
        };

        let result = self.run_phase(workflow, phase_index, phase, handler).await;
        let status = match result {
            Ok(status) => status,
            Err(cause) => {
                warn!(
                    workflow_id = %workflow.id,
                    phase = %phase,
                    phase_index,
                    cause = %cause,
                    "Workflow phase failed"
                );
                workflow.status = WorkflowStatus::Failed {
                    phase_index,
                    cause: cause.clone(),
                };
                workflow.completed_at = Some(Utc::now());
                self.retain(workflow.clone()).await;
                return Err(KernelError::PhaseFailed {
                    phase_index,
                    phase: phase.name().to_string(),
                    cause,
                });
            }
        };

        self.retain(workflow.clone()).await;
        Ok(status)
    }

    async fn run_phase<F, Fut>(
        &self,
        workflow: &mut WorkflowInstance,
        phase_index: usize,
        phase: Phase,
        handler: &F,
    ) -> Result<PhaseStatus, String>
    where
        F: Fn(PhaseRequest) -> Fut,
        Fut: Future<Output = Result<PhaseOutcome, String>>,
    {
        let agent = phase.owner();
        let agent_name = agent.name();
        let workflow_key = workflow.id.to_string();
        let start_time = Utc::now();
        let requested_session = workflow
            .agent_sessions
            .get(agent_name)
            .cloned()
            .ok_or_else(|| format!("no session for {agent_name}"))?;

        let participants = workflow.participants();
        let context = self
            .memory
            .agents()
            .get_agent_context(agent_name, None, false)
            .await
            .map_err(|e| e.to_string())?
            .restricted_to(&participants);

        let message = NewMessage::new(
            "phase_execution",
            format!("Executing {phase} phase: {}", workflow.description),
        )
        .with_metadata(json!({
            "workflowId": workflow.id,
            "phase": phase.name(),
            "phaseIndex": phase_index,
            "priority": workflow.priority.as_str(),
            "experience": context.metrics.total_interactions,
            "relevantLearnings": context.recent_learnings.len(),
        }));
        let appended = self
            .memory
            .conversations()
            .add_to_conversation(&requested_session, message, agent_name)
            .await
            .map_err(|e| e.to_string())?;
        if appended.resolution == SessionResolution::Created {
            warn!(
                workflow_id = %workflow.id,
                agent = agent_name,
                old = %requested_session,
                new = %appended.session_id,
                "Workflow session vanished; continuing in a new session"
            );
            workflow
                .agent_sessions
                .insert(agent_name.to_string(), appended.session_id.clone());
        }
        workflow.note(appended.outcome);
        let session_id = appended.session_id;

        debug!(workflow_id = %workflow.id, phase = %phase, agent = agent_name, "Running phase handler");
        let outcome = handler(PhaseRequest {
            workflow_id: workflow.id,
            description: workflow.description.clone(),
            priority: workflow.priority,
            phase,
            phase_index,
            agent,
            session_id: session_id.clone(),
            context: context.clone(),
        })
        .await?;

        if phase_index > 0 {
            let previous = workflow.phase_sequence[phase_index - 1];
            let outcome = self
                .memory
                .agents()
                .record_agent_interaction(
                    agent_name,
                    previous.owner().name(),
                    HANDOFF_INTERACTION,
                    json!({
                        "workflowId": workflow.id,
                        "fromPhase": previous.name(),
                        "toPhase": phase.name(),
                    }),
                )
                .await
                .map_err(|e| e.to_string())?;
            workflow.note(outcome);
        }

        let (status, state) = match &outcome {
            PhaseOutcome::Completed => (PhaseStatus::Completed, "phase_completed"),
            PhaseOutcome::Blocked { .. } => (PhaseStatus::Blocked, "phase_blocked"),
        };
        let outcome_state = self
            .memory
            .agents()
            .update_workflow_state(
                agent_name,
                &workflow_key,
                state,
                json!({ "phase": phase.name(), "phaseIndex": phase_index, "sessionId": session_id }),
            )
            .await
            .map_err(|e| e.to_string())?;
        workflow.note(outcome_state);

        workflow.phases.push(PhaseResult {
            phase,
            agent: agent_name.to_string(),
            session_id,
            start_time,
            context_snapshot: context,
            status,
        });
        workflow.current_phase = phase_index + 1;

        match outcome {
            PhaseOutcome::Completed => {
                info!(workflow_id = %workflow.id, phase = %phase, agent = agent_name, "Phase completed");
            }
            PhaseOutcome::Blocked { reason } => {
                info!(workflow_id = %workflow.id, phase = %phase, reason = %reason, "Phase blocked");
                workflow.status = WorkflowStatus::Blocked {
                    phase_index,
                    reason,
                };
            }
        }
        Ok(status)
    }

    /// Start a workflow and run every phase with the default handler.
    pub async fn execute_workflow(
        &self,
        description: &str,
        priority: Priority,
    ) -> KernelResult<WorkflowInstance> {
        self.execute_workflow_with(description, priority, complete_phase)
            .await
    }

    /// Start a workflow and run every phase through `handler`.
    ///
    /// Stops at the first blocked phase. On full completion the workflow is
    /// marked completed, a `workflow_completion` learning with the elapsed
    /// duration is recorded against ProjectManager, and every workflow
    /// session is marked completed.
    pub async fn execute_workflow_with<F, Fut>(
        &self,
        description: &str,
        priority: Priority,
        handler: F,
    ) -> KernelResult<WorkflowInstance>
    where
        F: Fn(PhaseRequest) -> Fut,
        Fut: Future<Output = Result<PhaseOutcome, String>>,
    {
        let mut workflow = self.start_workflow(description, priority).await?;

        for phase_index in 0..workflow.phase_sequence.len() {
            let status = self
                .execute_phase_with(&mut workflow, phase_index, &handler)
                .await?;
            if status == PhaseStatus::Blocked {
                return Ok(workflow);
            }
        }

        self.complete(&mut workflow).await?;
        Ok(workflow)
    }

    async fn complete(&self, workflow: &mut WorkflowInstance) -> KernelResult<()> {
        let completed_at = Utc::now();
        let duration_ms = (completed_at - workflow.started_at).num_milliseconds().max(0);
        workflow.status = WorkflowStatus::Completed;
        workflow.completed_at = Some(completed_at);

        let learning = NewLearning::new(format!(
            "Workflow completed in {duration_ms} ms: {}",
            workflow.description
        ))
        .with_type(COMPLETION_LEARNING)
        .with_context(json!({
            "workflowId": workflow.id,
            "durationMs": duration_ms,
            "phases": workflow.phases.len(),
            "priority": workflow.priority.as_str(),
        }));
        let (_, outcome) = self
            .memory
            .agents()
            .add_learning(AgentIdentity::ProjectManager.name(), learning)
            .await?;
        workflow.note(outcome);

        let sessions: Vec<(String, String)> = workflow
            .agent_sessions
            .iter()
            .map(|(a, s)| (a.clone(), s.clone()))
            .collect();
        for (agent, session_id) in sessions {
            let outcome = self
                .memory
                .conversations()
                .set_status(&session_id, &agent, SessionStatus::Completed)
                .await?;
            workflow.note(outcome);
        }

        info!(
            workflow_id = %workflow.id,
            duration_ms,
            phases = workflow.phases.len(),
            "Workflow completed"
        );
        self.retain(workflow.clone()).await;
        Ok(())
    }

    /// Get a workflow instance by id.
    pub async fn get_workflow(&self, id: WorkflowId) -> Option<WorkflowInstance> {
        self.workflows.read().await.get(&id).cloned()
    }

    /// All retained instances, oldest first.
    pub async fn list_workflows(&self) -> Vec<WorkflowInstance> {
        let mut all: Vec<WorkflowInstance> =
            self.workflows.read().await.values().cloned().collect();
        all.sort_by_key(|w| w.started_at);
        all
    }

    async fn retain(&self, workflow: WorkflowInstance) {
        let mut workflows = self.workflows.write().await;
        workflows.insert(workflow.id, workflow);

        // Evict oldest terminal instances when we exceed the cap
        if workflows.len() > Self::MAX_RETAINED_WORKFLOWS {
            let mut evictable: Vec<(WorkflowId, DateTime<Utc>)> = workflows
                .iter()
                .filter(|(_, w)| w.status.is_terminal())
                .map(|(id, w)| (*id, w.started_at))
                .collect();
            evictable.sort_by_key(|(_, t)| *t);

            let to_remove = workflows.len() - Self::MAX_RETAINED_WORKFLOWS;
            for (id, _) in evictable.into_iter().take(to_remove) {
                workflows.remove(&id);
                debug!(workflow_id = %id, "Evicted old workflow instance");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phasegate_types::config::MemoryConfig;

    async fn setup() -> (tempfile::TempDir, MemorySubstrate, WorkflowCoordinator) {
        let dir = tempfile::tempdir().unwrap();
        let memory = MemorySubstrate::open(dir.path(), MemoryConfig::default())
            .await
            .unwrap();
        let coordinator = WorkflowCoordinator::new(memory.clone());
        (dir, memory, coordinator)
    }

    #[test]
    fn test_phase_table() {
        let owners: Vec<&str> = PHASE_SEQUENCE.iter().map(|p| p.owner().name()).collect();
        assert_eq!(
            owners,
            vec![
                "ProjectManager",
                "Architect",
                "SecurityEngineer",
                "QAEngineer",
                "Implementer",
                "QAEngineer"
            ]
        );
    }

    #[test]
    fn test_priority_parse() {
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
        assert_eq!("normal".parse::<Priority>().unwrap(), Priority::Medium);
        assert!("urgent-ish".parse::<Priority>().is_err());
        assert_eq!(Priority::default(), Priority::Medium);
    }

    #[tokio::test]
    async fn test_start_opens_one_session_per_agent() {
        let (_dir, memory, coordinator) = setup().await;
        let wf = coordinator
            .start_workflow("Add login", Priority::High)
            .await
            .unwrap();
        assert_eq!(wf.agent_sessions.len(), 5);
        assert_eq!(wf.current_phase, 0);
        assert!(wf.phases.is_empty());

        let qa = memory
            .agents()
            .get_agent_memory("QAEngineer")
            .await
            .unwrap();
        assert_eq!(qa.workflow_state[&wf.id.to_string()].state, "initialized");
        let session = memory
            .conversations()
            .get_session(&wf.agent_sessions["QAEngineer"], "QAEngineer")
            .await
            .unwrap();
        assert_eq!(session.metadata.priority.as_deref(), Some("high"));
        assert_eq!(session.metadata.related_agents.len(), 5);
    }

    #[tokio::test]
    async fn test_execute_workflow_runs_all_phases() {
        let (_dir, memory, coordinator) = setup().await;
        let wf = coordinator
            .execute_workflow("Build payments", Priority::Medium)
            .await
            .unwrap();

        assert_eq!(wf.status, WorkflowStatus::Completed);
        assert!(wf.completed_at.is_some());
        assert_eq!(wf.current_phase, 6);
        let phases: Vec<Phase> = wf.phases.iter().map(|p| p.phase).collect();
        assert_eq!(phases, PHASE_SEQUENCE.to_vec());
        assert!(wf.phases.iter().all(|p| p.status == PhaseStatus::Completed));
        assert!(wf.warnings.is_empty());

        // QA and Validation share the QAEngineer session.
        assert_eq!(wf.phases[3].session_id, wf.phases[5].session_id);
        let history = memory
            .conversations()
            .get_conversation_history(&wf.phases[3].session_id, "QAEngineer", None)
            .await;
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|m| m.message_type == "phase_execution"));

        let pm = memory
            .agents()
            .get_agent_memory("ProjectManager")
            .await
            .unwrap();
        let completion = pm.learnings.last().unwrap();
        assert_eq!(completion.learning_type, COMPLETION_LEARNING);
        assert!(completion.context["durationMs"].as_i64().unwrap() >= 0);

        let session = memory
            .conversations()
            .get_session(&wf.agent_sessions["Architect"], "Architect")
            .await
            .unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
    }

    #[tokio::test]
    async fn test_handoff_points_to_previous_owner() {
        let (_dir, memory, coordinator) = setup().await;
        coordinator
            .execute_workflow("Audit", Priority::Low)
            .await
            .unwrap();

        let architect = memory.agents().get_agent_memory("Architect").await.unwrap();
        let rel = &architect.relationships["ProjectManager"];
        assert_eq!(rel.total_interactions, 1);
        assert_eq!(rel.interaction_types[HANDOFF_INTERACTION], 1);

        let pm = memory
            .agents()
            .get_agent_memory("ProjectManager")
            .await
            .unwrap();
        assert!(pm.relationships.is_empty());

        // Security -> QA and Implementation -> Validation both hand off from QA.
        let qa = memory.agents().get_agent_memory("QAEngineer").await.unwrap();
        assert_eq!(qa.relationships["SecurityEngineer"].total_interactions, 1);
        assert_eq!(qa.relationships["Implementer"].total_interactions, 1);
    }

    #[tokio::test]
    async fn test_out_of_order_phase_rejected() {
        let (_dir, _memory, coordinator) = setup().await;
        let mut wf = coordinator
            .start_workflow("Skip ahead", Priority::Medium)
            .await
            .unwrap();
        let err = coordinator.execute_phase(&mut wf, 2).await.unwrap_err();
        assert!(matches!(err, KernelError::Phasegate(PhasegateError::InvalidInput(_))));
        assert_eq!(wf.status, WorkflowStatus::Active);

        coordinator.execute_phase(&mut wf, 0).await.unwrap();
        assert!(coordinator.execute_phase(&mut wf, 0).await.is_err());
        assert_eq!(wf.current_phase, wf.phases.len());
    }

    #[tokio::test]
    async fn test_blocked_phase_stops_workflow() {
        let (_dir, _memory, coordinator) = setup().await;
        let wf = coordinator
            .execute_workflow_with("Blocked", Priority::Medium, |req: PhaseRequest| async move {
                if req.phase == Phase::Security {
                    Ok(PhaseOutcome::Blocked {
                        reason: "threat model missing".into(),
                    })
                } else {
                    Ok(PhaseOutcome::Completed)
                }
            })
            .await
            .unwrap();

        assert_eq!(
            wf.status,
            WorkflowStatus::Blocked {
                phase_index: 2,
                reason: "threat model missing".into()
            }
        );
        assert_eq!(wf.phases.len(), 3);
        assert_eq!(wf.phases[2].status, PhaseStatus::Blocked);
        assert_eq!(wf.current_phase, 3);
        assert!(wf.completed_at.is_none());
    }

    #[tokio::test]
    async fn test_failing_phase_marks_failed() {
        let (_dir, memory, coordinator) = setup().await;
        let err = coordinator
            .execute_workflow_with("Explodes", Priority::Medium, |req: PhaseRequest| async move {
                if req.phase == Phase::QA {
                    Err("criteria service unavailable".to_string())
                } else {
                    Ok(PhaseOutcome::Completed)
                }
            })
            .await
            .unwrap_err();

        match err {
            KernelError::PhaseFailed {
                phase_index,
                phase,
                cause,
            } => {
                assert_eq!(phase_index, 3);
                assert_eq!(phase, "QA");
                assert_eq!(cause, "criteria service unavailable");
            }
            other => panic!("unexpected error: {other}"),
        }

        let all = coordinator.list_workflows().await;
        assert_eq!(all.len(), 1);
        let wf = &all[0];
        assert!(matches!(
            wf.status,
            WorkflowStatus::Failed { phase_index: 3, .. }
        ));
        assert_eq!(wf.phases.len(), 3);
        assert_eq!(wf.current_phase, 3);

        let pm = memory
            .agents()
            .get_agent_memory("ProjectManager")
            .await
            .unwrap();
        assert!(pm
            .learnings
            .iter()
            .all(|l| l.learning_type != COMPLETION_LEARNING));
    }

    #[tokio::test]
    async fn test_context_restricted_to_participants() {
        let (_dir, memory, coordinator) = setup().await;
        memory
            .agents()
            .record_agent_interaction("Architect", "Marketing", "chat", json!({}))
            .await
            .unwrap();
        memory
            .agents()
            .record_agent_interaction("Architect", "SecurityEngineer", "review", json!({}))
            .await
            .unwrap();

        let wf = coordinator
            .execute_workflow("Scoped", Priority::Medium)
            .await
            .unwrap();
        let snapshot = &wf.phases[1].context_snapshot;
        assert_eq!(snapshot.agent, "Architect");
        let names: Vec<&str> = snapshot
            .relationships
            .iter()
            .map(|r| r.agent.as_str())
            .collect();
        assert_eq!(names, vec!["SecurityEngineer"]);
    }

    #[tokio::test]
    async fn test_retained_instances_capped() {
        let (_dir, _memory, coordinator) = setup().await;
        let template = coordinator
            .start_workflow("template", Priority::Low)
            .await
            .unwrap();
        let active_id = template.id;

        for i in 0..WorkflowCoordinator::MAX_RETAINED_WORKFLOWS + 10 {
            let mut wf = template.clone();
            wf.id = WorkflowId::new();
            wf.status = WorkflowStatus::Completed;
            wf.started_at = template.started_at + chrono::Duration::seconds(i as i64 + 1);
            coordinator.retain(wf).await;
        }

        let all = coordinator.list_workflows().await;
        assert_eq!(all.len(), WorkflowCoordinator::MAX_RETAINED_WORKFLOWS);
        assert!(coordinator.get_workflow(active_id).await.is_some());
    }
}
