//! PhasegateKernel: assembles the memory substrate and the workflow
//! coordinator from configuration.

use phasegate_memory::MemorySubstrate;
use phasegate_types::config::PhasegateConfig;
use std::path::Path;
use tracing::info;

use crate::config::load_config;
use crate::error::{KernelError, KernelResult};
use crate::workflow::WorkflowCoordinator;

/// The booted system. One per process.
pub struct PhasegateKernel {
    /// Effective configuration.
    pub config: PhasegateConfig,
    /// Store, cache and memory managers.
    pub memory: MemorySubstrate,
    /// Phase-gated workflow coordinator.
    pub workflows: WorkflowCoordinator,
}

impl PhasegateKernel {
    /// Boot from a config file (or the default path).
    pub async fn boot(config_path: Option<&Path>) -> KernelResult<Self> {
        let config = load_config(config_path);
        Self::boot_with_config(config).await
    }

    /// Boot with an explicit configuration.
    pub async fn boot_with_config(config: PhasegateConfig) -> KernelResult<Self> {
        let memory = MemorySubstrate::open(&config.data_dir, config.memory.clone())
            .await
            .map_err(|e| {
                KernelError::BootFailed(format!(
                    "cannot open storage at {}: {e}",
                    config.data_dir.display()
                ))
            })?;
        let workflows = WorkflowCoordinator::new(memory.clone());
        info!(data_dir = %config.data_dir.display(), "Phasegate kernel booted");
        Ok(Self {
            config,
            memory,
            workflows,
        })
    }

    /// Run the conversation retention sweep. `None` uses the configured window.
    pub async fn cleanup_old_data(&self, retention_days: Option<u32>) -> KernelResult<usize> {
        let days = retention_days.unwrap_or(self.config.retention.conversation_retention_days);
        Ok(self.memory.agents().cleanup_old_data(days).await?)
    }
}
