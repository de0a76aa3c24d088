//! Shared error types for the Phasegate system.

use thiserror::Error;

/// Top-level error type for the Phasegate system.
#[derive(Error, Debug)]
pub enum PhasegateError {
    /// A persisted record could not be decoded.
    #[error("Decode error at {path}: {reason}")]
    Decode {
        /// File that failed to decode.
        path: String,
        /// Why decoding failed.
        reason: String,
    },

    /// A record could not be written to disk.
    #[error("Write error at {path}: {reason}")]
    Write {
        /// File that failed to write.
        path: String,
        /// Why the write failed.
        reason: String,
    },

    /// The requested agent identity does not exist.
    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    /// The requested protocol method does not exist.
    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    /// The requested tool does not exist.
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// The requested session does not exist.
    #[error("Unknown session: {0}")]
    UnknownSession(String),

    /// An inbound protocol line could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid caller input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for PhasegateError {
    fn from(e: serde_json::Error) -> Self {
        PhasegateError::Serialization(e.to_string())
    }
}

/// Alias for Result with PhasegateError.
pub type PhasegateResult<T> = Result<T, PhasegateError>;
