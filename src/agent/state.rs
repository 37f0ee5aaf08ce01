//! Agent runtime state.

/// High-level runtime status of the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AgentState {
    #[default]
    Idle,
    Streaming,
    ToolExecuting,
    Error,
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentState::Idle => write!(f, "idle"),
            AgentState::Streaming => write!(f, "streaming"),
            AgentState::ToolExecuting => write!(f, "tool_executing"),
            AgentState::Error => write!(f, "error"),
        }
    }
}

/// Shared mutable run state: the lifecycle state plus the active run's
/// cancellation token. One lock covers both so Busy checks and Cancel
/// never race.
#[derive(Default)]
pub(crate) struct RunState {
    pub state: AgentState,
    pub cancel: Option<tokio_util::sync::CancellationToken>,
}
