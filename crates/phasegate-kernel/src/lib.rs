//! Core kernel for Phasegate.
//!
//! Boots the memory substrate from configuration and drives the phase-gated
//! multi-agent workflow on top of it.

pub mod config;
pub mod error;
pub mod kernel;
pub mod workflow;

pub use kernel::PhasegateKernel;
