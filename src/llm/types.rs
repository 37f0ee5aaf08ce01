//! Canonical provider-agnostic conversation and streaming types.
//!
//! Every provider translates its wire format into these types; the agent
//! loop, session engine, and UI only ever see this surface.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::retry::RetryPolicy;

// ============================================================================
// Conversation Model
// ============================================================================

/// The author of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// Canonical reason a model response stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Stop,
    Length,
    ToolUse,
    Error,
    Aborted,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Stop => write!(f, "stop"),
            StopReason::Length => write!(f, "length"),
            StopReason::ToolUse => write!(f, "tool_use"),
            StopReason::Error => write!(f, "error"),
            StopReason::Aborted => write!(f, "aborted"),
        }
    }
}

/// A canonical content unit. v1 supports text only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }
}

/// A model-emitted tool invocation.
///
/// `arguments` is always a JSON object; providers reassembling chunked
/// fragments default an empty buffer to `{}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default = "empty_object")]
    pub arguments: serde_json::Value,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// The local execution result for a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub tool_name: String,
    pub content: String,
    pub is_error: bool,
}

/// Provider-agnostic conversation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<ToolResult>,
}

impl Message {
    /// A plain user text message.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::text(text)],
            tool_calls: Vec::new(),
            tool_result: None,
        }
    }

    /// A plain assistant text message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: vec![ContentBlock::text(text)],
            tool_calls: Vec::new(),
            tool_result: None,
        }
    }

    /// A tool-role message carrying one execution result.
    pub fn tool_result(result: ToolResult) -> Self {
        Self {
            role: Role::Tool,
            content: Vec::new(),
            tool_calls: Vec::new(),
            tool_result: Some(result),
        }
    }

    /// Joined non-empty text block contents; falls back to the tool result body.
    pub fn text(&self) -> String {
        if self.content.is_empty() {
            if let Some(result) = &self.tool_result {
                return result.content.trim().to_string();
            }
            return String::new();
        }
        let parts: Vec<&str> = self
            .content
            .iter()
            .map(|block| match block {
                ContentBlock::Text { text } => text.trim(),
            })
            .filter(|text| !text.is_empty())
            .collect();
        parts.join("\n")
    }
}

/// Provider token accounting and computed cost.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,
    pub total_tokens: u64,
    pub cost_usd: f64,
}

impl Usage {
    /// Total tokens consumed across all four usage buckets.
    pub fn token_count(&self) -> u64 {
        self.input_tokens + self.output_tokens + self.cache_read_tokens + self.cache_write_tokens
    }
}

// ============================================================================
// Request
// ============================================================================

/// How the provider may choose tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolChoice {
    Auto,
    Any,
    None,
    Tool { name: String },
}

/// A tool exposed to the model.
///
/// `schema` is a JSON-Schema object; see [`crate::llm::schema`] for
/// normalization and struct reflection helpers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub schema: serde_json::Value,
}

/// The provider-agnostic streaming request.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub model: String,
    pub system: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSpec>,
    /// Defaults to 1024 when zero.
    pub max_tokens: u32,
    pub temperature: Option<f64>,
    pub tool_choice: Option<ToolChoice>,
    pub metadata: HashMap<String, String>,
    /// Per-request retry override merged over the provider default.
    pub retry: RetryPolicy,
}

// ============================================================================
// Stream Events
// ============================================================================

/// Provider-native content block metadata, forwarded at block start.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentBlockStart {
    pub index: u64,
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_use_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,
}

/// Final status when a stream ends.
#[derive(Debug, Clone, PartialEq)]
pub struct DonePayload {
    pub reason: StopReason,
    pub usage: Usage,
}

/// The provider-agnostic streaming event.
///
/// Exactly one terminal (`Done` or `Error`) ends every stream; after it no
/// further events are emitted.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Start,
    ContentBlockStart(ContentBlockStart),
    TextDelta(String),
    ToolCallStart(ToolCall),
    ToolCallDelta(String),
    ToolCallEnd(ToolCall),
    ToolResult(ToolResult),
    Usage(Usage),
    Done(DonePayload),
    Error { done: DonePayload, message: String },
    QueuedMessage(Message),
}

impl Event {
    /// Whether this event ends a stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::Done(_) | Event::Error { .. })
    }
}
