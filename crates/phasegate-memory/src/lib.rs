//! Memory substrate for Phasegate.
//!
//! Layers, leaf first:
//! - **Store** ([`store`]): JSON files under a storage root, one per agent
//!   memory and one per conversation session
//! - **Cache** ([`cache`]): in-process read-through / write-through maps
//! - **Managers** ([`agent_memory`], [`conversation`]): record lifecycles,
//!   bounded retention, projections
//!
//! [`MemorySubstrate`] wires the layers together. Construct one per process
//! and share it; there is no ambient global state.

pub mod agent_memory;
pub mod cache;
pub mod conversation;
pub mod locks;
pub mod session_id;
pub mod store;

mod substrate;
pub use substrate::MemorySubstrate;
