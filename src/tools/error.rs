//! Tool execution errors.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from tool registration and execution.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Registration with an empty name.
    #[error("tool name is required")]
    NameRequired,

    /// A tool with this name is already registered.
    #[error("tool already registered: {0}")]
    AlreadyRegistered(String),

    /// Lookup failed.
    #[error("tool not found: {0}")]
    NotFound(String),

    /// Arguments did not decode or failed validation.
    #[error("invalid tool parameters: {0}")]
    InvalidParams(String),

    /// A path resolved outside the configured workspace root.
    #[error("path is outside workspace: {path} (workspace: {workspace})")]
    PathOutsideWorkspace { path: String, workspace: PathBuf },

    /// Execution failed with no partial output to report.
    #[error("{0}")]
    Failed(String),

    /// Underlying I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The cancellation token fired during execution.
    #[error("tool execution cancelled")]
    Cancelled,
}
