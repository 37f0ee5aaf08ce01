//! gar — the runtime core of an interactive coding assistant.
//!
//! The crate wires four subsystems together:
//!
//! - [`llm`] — canonical streaming types, the provider contract, retry and
//!   pricing, and the Anthropic SSE implementation.
//! - [`agent`] — the multi-turn loop that drives a provider, executes tool
//!   calls, and interleaves queued user messages.
//! - [`tools`] — the tool contract, registry, and the built-in
//!   read/write/edit/bash/grep/find/ls tools with workspace confinement.
//! - [`session`] — the append-only entry DAG, JSONL persistence, context
//!   rebuild, compaction, and branch/session switching.
//!
//! A UI drives a [`session::SessionEngine`] (submit/steer/record_event)
//! which in turn drives an [`agent::Agent`] over any [`llm::Provider`].

pub mod agent;
pub mod config;
pub mod llm;
pub mod session;
pub mod sse;
pub mod tools;

pub use agent::{Agent, AgentConfig, AgentError, AgentState, QueueMode};
pub use config::{Config, ConfigError};
pub use llm::{
    AnthropicConfig, AnthropicProvider, Event, LlmError, Message, Provider, Request, StopReason,
    ToolCall, ToolResult, Usage,
};
pub use session::{SessionEngine, SessionEngineConfig, SessionError, SessionStore};
pub use tools::{Tool, ToolError, ToolRegistry, Workspace};
