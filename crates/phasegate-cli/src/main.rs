//! Phasegate CLI.
//!
//! Every command boots an in-process kernel. `serve` keeps stdout for
//! protocol lines, so all logging goes to stderr.

mod cli;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Commands, MemoryCommands, WorkflowCommands};
use phasegate_gateway::SessionGateway;
use phasegate_kernel::config::{default_config_path, load_config, write_default_config};
use phasegate_kernel::workflow::Priority;
use phasegate_kernel::PhasegateKernel;
use phasegate_types::agent::AgentIdentity;
use serde_json::json;
use std::sync::Arc;

fn init_tracing_stderr(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = load_config(Some(&config_path));
    init_tracing_stderr(&config.log_level);

    match cli.command {
        Commands::Init => {
            let wrote = write_default_config(&config_path)
                .with_context(|| format!("writing {}", config_path.display()))?;
            let kernel = PhasegateKernel::boot_with_config(load_config(Some(&config_path))).await?;
            print_json(&json!({
                "config": config_path,
                "configCreated": wrote,
                "dataDir": kernel.config.data_dir,
            }))?;
        }
        Commands::Serve => {
            let kernel = PhasegateKernel::boot_with_config(config).await?;
            let gateway = SessionGateway::new(Arc::new(kernel));
            phasegate_gateway::serve_stdio(&gateway)
                .await
                .context("gateway transport failed")?;
        }
        Commands::Workflow(WorkflowCommands::Run {
            description,
            priority,
        }) => {
            let priority: Priority = priority.parse()?;
            let kernel = PhasegateKernel::boot_with_config(config).await?;
            let workflow = kernel
                .workflows
                .execute_workflow(&description, priority)
                .await?;
            print_json(&json!({
                "id": workflow.id,
                "status": workflow.status,
                "phases": workflow
                    .phases
                    .iter()
                    .map(|p| json!({"phase": p.phase, "agent": p.agent, "sessionId": p.session_id}))
                    .collect::<Vec<_>>(),
                "agentSessions": workflow.agent_sessions,
                "startedAt": workflow.started_at,
                "completedAt": workflow.completed_at,
                "warnings": workflow.warnings,
            }))?;
        }
        Commands::Memory(cmd) => {
            let kernel = PhasegateKernel::boot_with_config(config).await?;
            match cmd {
                MemoryCommands::Summary { agent } => {
                    let agent: AgentIdentity = agent.parse()?;
                    let summary = kernel
                        .memory
                        .agents()
                        .get_memory_summary(agent.name())
                        .await?;
                    print_json(&summary)?;
                }
                MemoryCommands::History {
                    agent,
                    session,
                    limit,
                } => {
                    let agent: AgentIdentity = agent.parse()?;
                    let messages = kernel
                        .memory
                        .conversations()
                        .get_conversation_history(&session, agent.name(), limit)
                        .await;
                    print_json(&messages)?;
                }
                MemoryCommands::Recent { agent, limit } => {
                    let agent: AgentIdentity = agent.parse()?;
                    let sessions = kernel
                        .memory
                        .conversations()
                        .get_recent_conversations(agent.name(), limit)
                        .await?;
                    print_json(&sessions)?;
                }
            }
        }
        Commands::Cleanup { days } => {
            let kernel = PhasegateKernel::boot_with_config(config).await?;
            let deleted = kernel.cleanup_old_data(days).await?;
            print_json(&json!({ "deleted": deleted }))?;
        }
    }
    Ok(())
}
