//! End-to-end workflow runs against real files.

use phasegate_kernel::workflow::{Phase, PhaseOutcome, PhaseRequest, Priority, WorkflowStatus};
use phasegate_kernel::PhasegateKernel;
use phasegate_memory::MemorySubstrate;
use phasegate_types::agent::AgentIdentity;
use phasegate_types::config::{MemoryConfig, PhasegateConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

async fn boot(dir: &tempfile::TempDir) -> PhasegateKernel {
    PhasegateKernel::boot_with_config(PhasegateConfig::with_data_dir(dir.path()))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_workflow_persists_memory_and_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let kernel = boot(&dir).await;

    let wf = kernel
        .workflows
        .execute_workflow("Ship audit log", Priority::High)
        .await
        .unwrap();
    assert_eq!(wf.status, WorkflowStatus::Completed);
    assert_eq!(wf.phases.len(), 6);

    let conversations = std::fs::read_dir(dir.path().join("conversations"))
        .unwrap()
        .count();
    assert_eq!(conversations, 5);
    for agent in AgentIdentity::ALL {
        assert!(dir
            .path()
            .join("context")
            .join(format!("{}.json", agent.name()))
            .exists());
    }

    // A second process sees the same state from disk.
    let reopened = MemorySubstrate::open(dir.path(), MemoryConfig::default())
        .await
        .unwrap();
    let qa = reopened
        .agents()
        .get_agent_memory("QAEngineer")
        .await
        .unwrap();
    assert_eq!(qa.workflow_state[&wf.id.to_string()].state, "phase_completed");
    assert_eq!(
        qa.workflow_state[&wf.id.to_string()].metadata["phase"],
        "Validation"
    );
    let recent = reopened
        .conversations()
        .get_recent_conversations("QAEngineer", None)
        .await
        .unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].message_count, 2);
}

#[tokio::test]
async fn test_handler_sees_each_phase_once_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let kernel = boot(&dir).await;
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let calls = Arc::new(AtomicUsize::new(0));

    let seen_in = seen.clone();
    let calls_in = calls.clone();
    kernel
        .workflows
        .execute_workflow_with("Observe", Priority::Medium, move |req: PhaseRequest| {
            let seen = seen_in.clone();
            let calls = calls_in.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                seen.lock().unwrap().push((req.phase_index, req.phase, req.agent));
                Ok(PhaseOutcome::Completed)
            }
        })
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 6);
    let seen = seen.lock().unwrap();
    assert_eq!(seen[0], (0, Phase::Requirements, AgentIdentity::ProjectManager));
    assert_eq!(seen[5], (5, Phase::Validation, AgentIdentity::QAEngineer));
}

#[tokio::test]
async fn test_second_workflow_accumulates_experience() {
    let dir = tempfile::tempdir().unwrap();
    let kernel = boot(&dir).await;
    kernel
        .workflows
        .execute_workflow("First", Priority::Low)
        .await
        .unwrap();
    let second = kernel
        .workflows
        .execute_workflow("Second", Priority::Low)
        .await
        .unwrap();

    let architect = &second.phases[1].context_snapshot;
    assert!(architect.metrics.total_interactions > 0);
    assert_eq!(
        architect
            .relationships
            .iter()
            .find(|r| r.agent == "ProjectManager")
            .and_then(|r| r.most_frequent_type.clone())
            .as_deref(),
        Some("workflow_handoff")
    );
    assert_eq!(kernel.workflows.list_workflows().await.len(), 2);
}
