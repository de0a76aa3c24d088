//! Session gateway for Phasegate.
//!
//! Exposes agent invocation, memory and session management, and workflow
//! execution as JSON-RPC 2.0 methods over a line-delimited transport: one
//! request per input line, one response per output line. Logging goes to
//! stderr so stdout carries protocol lines only.

pub mod catalog;
pub mod clock;
pub mod server;
pub mod transport;

pub use server::SessionGateway;
pub use transport::{serve, serve_stdio};
