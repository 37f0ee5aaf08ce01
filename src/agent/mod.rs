//! The multi-turn agent loop and its message queues.

pub mod error;
pub mod forwarder;
pub mod queues;
pub mod run_loop;
pub mod runner;
pub mod state;

pub use error::AgentError;
pub use queues::{MessageQueues, QueueMode};
pub use run_loop::SKIPPED_TOOL_CALL_MESSAGE;
pub use runner::{Agent, AgentConfig};
pub use state::AgentState;
