//! Agent loop errors.

use thiserror::Error;

use crate::llm::LlmError;
use crate::tools::ToolError;

/// Errors from agent runs and queue configuration.
#[derive(Debug, Error)]
pub enum AgentError {
    /// A run is already active.
    #[error("agent is already running")]
    Busy,

    /// Unknown queue mode string.
    #[error("invalid queue mode: {0:?}")]
    InvalidQueueMode(String),

    /// The loop hit the configured turn limit without a non-tool terminal.
    #[error("max turns exceeded")]
    MaxTurnsExceeded,

    /// Continue requires an existing conversation tail.
    #[error("no messages to continue from")]
    NoMessagesToContinue,

    /// Continue from an assistant tail requires queued user input.
    #[error("cannot continue from assistant tail without queued messages")]
    ContinueFromAssistantTail,

    /// The provider stream closed without emitting `done` or `error`.
    #[error("provider stream ended without terminal event")]
    MissingTerminal,

    /// The run was cancelled.
    #[error("run aborted")]
    Aborted,

    #[error(transparent)]
    Provider(#[from] LlmError),

    #[error(transparent)]
    Tool(#[from] ToolError),
}
