//! Kernel-specific error types.

use phasegate_types::error::PhasegateError;
use thiserror::Error;

/// Kernel error type wrapping PhasegateError with kernel-specific context.
#[derive(Error, Debug)]
pub enum KernelError {
    /// A wrapped PhasegateError.
    #[error(transparent)]
    Phasegate(#[from] PhasegateError),

    /// The kernel failed to boot.
    #[error("Boot failed: {0}")]
    BootFailed(String),

    /// A workflow phase raised an error. The workflow is left `Failed`.
    #[error("Phase {phase} (index {phase_index}) failed: {cause}")]
    PhaseFailed {
        phase_index: usize,
        phase: String,
        cause: String,
    },
}

/// Alias for kernel results.
pub type KernelResult<T> = Result<T, KernelError>;
