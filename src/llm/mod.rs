//! Provider-agnostic LLM surface: canonical types, the streaming provider
//! contract, retry/backoff, pricing, and the Anthropic implementation.

pub mod anthropic;
pub mod error;
pub mod mock;
pub mod pricing;
pub mod provider;
pub mod retry;
pub mod schema;
pub mod types;

pub use anthropic::{AnthropicConfig, AnthropicProvider};
pub use error::LlmError;
pub use mock::MockProvider;
pub use pricing::{ModelPricing, calculate_cost};
pub use provider::{EVENT_CHANNEL_CAPACITY, EventReceiver, Provider, validate_request};
pub use retry::{ResolvedRetryPolicy, RetryPolicy};
pub use schema::{ToolJsonSchema, decode_tool_schema, tool_spec_for};
pub use types::{
    ContentBlock, ContentBlockStart, DonePayload, Event, Message, Request, Role, StopReason,
    ToolCall, ToolChoice, ToolResult, ToolSpec, Usage,
};
