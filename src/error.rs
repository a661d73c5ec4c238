//! Error types for ecoshim
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// Top-level errors surfaced to callers of the dispatcher and transport
#[derive(Debug, Error)]
pub enum ShimError {
    /// No handler is registered under the requested tool name
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// The ledger could not be read or written
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration could not be loaded or is invalid
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures of the history ledger
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// The connection mutex was poisoned by a panicking writer
    #[error("ledger lock poisoned: {0}")]
    Lock(String),

    /// The record violates a schema constraint
    #[error("constraint violated: {0}")]
    Constraint(String),
}

/// Failures raised by a handler while performing its external action.
///
/// These never escape the dispatcher: they are recorded as `success = false`
/// with the rendered message as the result.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// The wrapped automation is not present on this machine
    #[error("{0}")]
    NotInstalled(String),

    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with code {}: {stderr}", exit_label(.code))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("`{command}` timed out after {timeout_ms}ms")]
    Timeout { command: String, timeout_ms: u64 },

    /// A cooperating service answered with an error or could not be reached
    #[error("Service error: {0}")]
    Service(String),

    #[error("Malformed output: {0}")]
    MalformedOutput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn exit_label(code: &Option<i32>) -> String {
    code.map(|c| c.to_string()).unwrap_or_else(|| "none".to_string())
}

/// Result type alias for ecoshim operations
pub type Result<T> = std::result::Result<T, ShimError>;
