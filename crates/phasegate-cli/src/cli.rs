//! Clap CLI definitions for Phasegate.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub const AFTER_HELP: &str = "\
Examples:
  phasegate init                          Create config and storage directories
  phasegate serve                         Serve the JSON-RPC gateway on stdio
  phasegate workflow run \"Add SSO\"        Run all six phases for a task
  phasegate memory summary Architect      Show an agent's memory counts
  phasegate cleanup --days 30             Delete old conversation files";

/// Phasegate: persistent agent memory and phase-gated workflows.
#[derive(Parser)]
#[command(name = "phasegate", version, after_help = AFTER_HELP)]
pub struct Cli {
    /// Path to config file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the storage layout and write a default config if none exists.
    Init,
    /// Serve the session gateway over stdin/stdout.
    Serve,
    /// Run workflows [*].
    #[command(subcommand)]
    Workflow(WorkflowCommands),
    /// Inspect agent memory and conversations [*].
    #[command(subcommand)]
    Memory(MemoryCommands),
    /// Delete conversation files older than the retention window.
    Cleanup {
        /// Retention window in days (defaults to the configured value).
        #[arg(long)]
        days: Option<u32>,
    },
}

#[derive(Subcommand)]
pub enum WorkflowCommands {
    /// Run every phase from Requirements to Validation and print the result.
    Run {
        /// What the workflow is about.
        description: String,
        /// low, medium, high or critical.
        #[arg(long, default_value = "medium")]
        priority: String,
    },
}

#[derive(Subcommand)]
pub enum MemoryCommands {
    /// Aggregate counts for one agent.
    Summary {
        /// Agent name, e.g. Architect or qa_engineer.
        agent: String,
    },
    /// Last messages of one session.
    History {
        agent: String,
        session: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Most recently modified sessions of one agent.
    Recent {
        agent: String,
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_workflow_run() {
        let cli = Cli::try_parse_from([
            "phasegate",
            "--config",
            "/tmp/pg.toml",
            "workflow",
            "run",
            "Add SSO",
            "--priority",
            "high",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/pg.toml")));
        match cli.command {
            Commands::Workflow(WorkflowCommands::Run {
                description,
                priority,
            }) => {
                assert_eq!(description, "Add SSO");
                assert_eq!(priority, "high");
            }
            _ => panic!("expected workflow run"),
        }
    }

    #[test]
    fn test_parse_memory_history() {
        let cli = Cli::try_parse_from([
            "phasegate",
            "memory",
            "history",
            "Architect",
            "Architect-0a1b2c3d",
            "--limit",
            "5",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Memory(MemoryCommands::History { limit: Some(5), .. })
        ));
    }
}
