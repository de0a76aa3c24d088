//! Core types for the Phasegate agent memory and workflow system.
//!
//! This crate defines the persisted record schemas, the fixed agent identity
//! table, configuration structs and shared errors used across the memory
//! substrate, kernel and gateway. It contains no business logic.

pub mod agent;
pub mod config;
pub mod conversation;
pub mod error;
pub mod memory;
pub mod tool;

/// Version stamped into every persisted record.
///
/// Records carrying a newer version than this are refused on load.
pub const SCHEMA_VERSION: u32 = 1;

pub(crate) fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}
