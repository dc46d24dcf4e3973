//! Error types shared by every subsystem of the collaboration runtime
//!
//! Errors are grouped by the subsystem that raised them so callers can tell a
//! precondition failure (which aborts a collaboration before it starts) apart
//! from an agent turn failure or a persistence failure. Payloads are plain
//! strings, which keeps the enum `Clone` and lets the same error travel through
//! the event stream and back to the caller.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EnsembleError {
    #[error("Precondition failed: {0}")]
    Precondition(String),
    #[error("LLM interaction failed: {0}")]
    LLMError(String),
    #[error("Tool execution failed for '{tool_name}': {message}")]
    ToolError { tool_name: String, message: String },
    #[error("MCP client error: {0}")]
    MCPError(String),
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Parsing error: {0}")]
    ParsingError(String),
    #[error("I/O error: {0}")]
    IoError(String),
    #[error("Operation cancelled: {0}")]
    Cancelled(String),
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<std::io::Error> for EnsembleError {
    fn from(err: std::io::Error) -> Self {
        EnsembleError::IoError(err.to_string())
    }
}

impl From<reqwest::Error> for EnsembleError {
    fn from(err: reqwest::Error) -> Self {
        EnsembleError::LLMError(err.to_string())
    }
}

impl From<sqlx::Error> for EnsembleError {
    fn from(err: sqlx::Error) -> Self {
        EnsembleError::StorageError(err.to_string())
    }
}

impl From<serde_json::Error> for EnsembleError {
    fn from(err: serde_json::Error) -> Self {
        EnsembleError::ParsingError(err.to_string())
    }
}

impl From<serde_yaml::Error> for EnsembleError {
    fn from(err: serde_yaml::Error) -> Self {
        EnsembleError::ConfigError(err.to_string())
    }
}
