//! Anthropic Messages API streaming provider.
//!
//! Speaks the native SSE wire format over reqwest and translates it into
//! canonical [`Event`]s. Retries are performed only while no visible output
//! (text delta, tool-call delta, or tool-call start) has been emitted.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::error::LlmError;
use super::pricing::{ModelPricing, calculate_cost};
use super::provider::{
    EVENT_CHANNEL_CAPACITY, EventReceiver, Provider, send_event, send_terminal, validate_request,
};
use super::retry::{ResolvedRetryPolicy, RetryPolicy, sleep_unless_cancelled};
use super::schema::decode_tool_schema;
use super::types::{
    ContentBlockStart, DonePayload, Event, Message, Request, Role, StopReason, ToolCall,
    ToolChoice, Usage,
};
use crate::sse::SseDecoder;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_API_VERSION: &str = "2023-06-01";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(90);
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Configuration for [`AnthropicProvider`].
#[derive(Debug, Default)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub base_url: Option<String>,
    pub version: Option<String>,
    pub http_client: Option<reqwest::Client>,
    pub retry: RetryPolicy,
    pub pricing: HashMap<String, ModelPricing>,
}

/// Anthropic provider with native SSE streaming.
pub struct AnthropicProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    version: String,
    retry: RetryPolicy,
    pricing: HashMap<String, ModelPricing>,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicConfig) -> Self {
        let client = config.http_client.unwrap_or_else(|| {
            reqwest::Client::builder()
                .timeout(DEFAULT_HTTP_TIMEOUT)
                .build()
                .unwrap_or_default()
        });
        let base_url = config
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        Self {
            client,
            base_url,
            api_key: config.api_key.trim().to_string(),
            version: config
                .version
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            retry: config.retry,
            pricing: config.pricing,
        }
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    async fn stream(
        &self,
        req: &Request,
        cancel: &CancellationToken,
    ) -> Result<EventReceiver, LlmError> {
        if self.api_key.is_empty() {
            return Err(LlmError::MissingCredentials);
        }
        validate_request(req)?;
        let body = to_wire_request(req)?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let retry = RetryPolicy::merge(self.retry, req.retry);
        let task = StreamTask {
            client: self.client.clone(),
            url: format!("{}/v1/messages", self.base_url),
            api_key: self.api_key.clone(),
            version: self.version.clone(),
            pricing: self.pricing.get(&req.model).copied(),
            body,
            retry,
            cancel: cancel.clone(),
            tx,
        };
        tokio::spawn(task.run());
        Ok(rx)
    }
}

// ============================================================================
// Streaming Task
// ============================================================================

struct StreamTask {
    client: reqwest::Client,
    url: String,
    api_key: String,
    version: String,
    pricing: Option<ModelPricing>,
    body: WireRequest,
    retry: ResolvedRetryPolicy,
    cancel: CancellationToken,
    tx: mpsc::Sender<Event>,
}

/// Incremental response state across one logical stream request, carried
/// over retries so `start` is emitted once and usage survives.
#[derive(Default)]
struct StreamState {
    usage: Usage,
    reason: Option<StopReason>,
    visible_emitted: bool,
    start_emitted: bool,
    done_emitted: bool,
    accumulators: HashMap<u64, ToolAccumulator>,
}

/// Reconstructs chunked JSON tool arguments for one content block.
struct ToolAccumulator {
    id: String,
    name: String,
    buffer: String,
}

impl StreamTask {
    async fn run(self) {
        let mut state = StreamState::default();
        let mut attempt: u32 = 0;

        loop {
            let result = self.stream_once(&mut state).await;
            let err = match result {
                Ok(()) => return,
                Err(err) => err,
            };

            if self.cancel.is_cancelled() || matches!(err, LlmError::Aborted) {
                send_terminal(&self.tx, abort_event(&state)).await;
                return;
            }

            let retryable =
                err.is_retryable() && !state.visible_emitted && attempt < self.retry.max_retries;
            if !retryable {
                send_terminal(
                    &self.tx,
                    Event::Error {
                        done: DonePayload {
                            reason: StopReason::Error,
                            usage: state.usage.clone(),
                        },
                        message: format!("anthropic stream: {err}"),
                    },
                )
                .await;
                return;
            }

            let delay = self.retry.backoff_delay(attempt);
            tracing::debug!(attempt, ?delay, error = %err, "retrying anthropic stream");
            if !sleep_unless_cancelled(&self.cancel, delay).await {
                send_terminal(&self.tx, abort_event(&state)).await;
                return;
            }
            attempt += 1;
        }
    }

    async fn stream_once(&self, state: &mut StreamState) -> Result<(), LlmError> {
        let response = self
            .client
            .post(&self.url)
            .header("content-type", "application/json")
            .header("accept", "text/event-stream")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.version)
            .json(&self.body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Api { status, message });
        }

        if !state.start_emitted {
            self.emit(Event::Start).await?;
            state.start_emitted = true;
        }

        let mut events = SseDecoder::new(response.bytes_stream().boxed());
        while let Some(item) = events.next().await {
            if self.cancel.is_cancelled() {
                return Err(LlmError::Aborted);
            }
            let sse = item.map_err(LlmError::Request)?;
            if sse.data.is_empty() {
                continue;
            }

            let wire: WireEvent = match serde_json::from_str(&sse.data) {
                Ok(wire) => wire,
                Err(e) => {
                    tracing::debug!(data = %sse.data, error = %e, "unparseable anthropic sse payload");
                    continue;
                }
            };
            self.handle_wire_event(state, wire).await?;
            if state.done_emitted {
                return Ok(());
            }
        }

        if state.done_emitted {
            Ok(())
        } else {
            Err(LlmError::TruncatedStream)
        }
    }

    async fn handle_wire_event(
        &self,
        state: &mut StreamState,
        wire: WireEvent,
    ) -> Result<(), LlmError> {
        match wire {
            WireEvent::MessageStart { message } => {
                if let Some(usage) = message.usage {
                    self.apply_usage(state, &usage);
                    self.emit(Event::Usage(state.usage.clone())).await?;
                }
                Ok(())
            }
            WireEvent::ContentBlockStart {
                index,
                content_block,
            } => self.handle_block_start(state, index, content_block).await,
            WireEvent::ContentBlockDelta { index, delta } => {
                if let Some(text) = delta.text {
                    if !text.is_empty() {
                        state.visible_emitted = true;
                        self.emit(Event::TextDelta(text)).await?;
                    }
                    return Ok(());
                }
                if let Some(fragment) = delta.partial_json {
                    let acc = state.accumulators.get_mut(&index).ok_or_else(|| {
                        LlmError::Protocol(format!(
                            "tool_call accumulator not found for index {index}"
                        ))
                    })?;
                    acc.buffer.push_str(&fragment);
                    state.visible_emitted = true;
                    self.emit(Event::ToolCallDelta(fragment)).await?;
                }
                Ok(())
            }
            WireEvent::ContentBlockStop { index } => {
                let Some(acc) = state.accumulators.remove(&index) else {
                    return Ok(());
                };
                let arguments = finalize_tool_arguments(&acc.buffer)?;
                state.visible_emitted = true;
                self.emit(Event::ToolCallEnd(ToolCall::new(acc.id, acc.name, arguments)))
                    .await
            }
            WireEvent::MessageDelta { delta, usage } => {
                if let Some(delta) = delta {
                    if let Some(reason) = delta.stop_reason.filter(|r| !r.is_empty()) {
                        state.reason = Some(map_stop_reason(&reason)?);
                    }
                }
                if let Some(usage) = usage {
                    self.apply_usage(state, &usage);
                    self.emit(Event::Usage(state.usage.clone())).await?;
                }
                Ok(())
            }
            WireEvent::MessageStop => {
                state.done_emitted = true;
                self.emit(Event::Done(DonePayload {
                    reason: state.reason.unwrap_or(StopReason::Stop),
                    usage: state.usage.clone(),
                }))
                .await
            }
            WireEvent::Error { error } => Err(LlmError::Api {
                status: 500,
                message: format!("{}: {}", error.error_type, error.message),
            }),
            WireEvent::Ping | WireEvent::Unknown => Ok(()),
        }
    }

    async fn handle_block_start(
        &self,
        state: &mut StreamState,
        index: u64,
        block: WireContentBlock,
    ) -> Result<(), LlmError> {
        let mut start = ContentBlockStart {
            index,
            block_type: block.block_type.clone(),
            ..ContentBlockStart::default()
        };
        match block.block_type.as_str() {
            "text" => {
                start.text = block.text;
                self.emit(Event::ContentBlockStart(start)).await
            }
            "thinking" => {
                start.thinking = block.thinking;
                start.signature = block.signature;
                self.emit(Event::ContentBlockStart(start)).await
            }
            "redacted_thinking" => {
                start.data = block.data;
                self.emit(Event::ContentBlockStart(start)).await
            }
            "tool_use" => {
                let id = block.id.unwrap_or_default();
                let name = block.name.unwrap_or_default();
                let initial = block
                    .input
                    .unwrap_or_else(|| Value::Object(serde_json::Map::new()));

                let mut acc = ToolAccumulator {
                    id: id.clone(),
                    name: name.clone(),
                    buffer: String::new(),
                };
                if initial.as_object().is_some_and(|map| !map.is_empty()) {
                    acc.buffer = initial.to_string();
                }
                state.accumulators.insert(index, acc);
                state.visible_emitted = true;

                start.id = Some(id.clone());
                start.name = Some(name.clone());
                start.input = Some(initial.clone());
                self.emit(Event::ContentBlockStart(start)).await?;
                self.emit(Event::ToolCallStart(ToolCall::new(id, name, initial)))
                    .await
            }
            "server_tool_use" => {
                start.id = block.id;
                start.name = block.name;
                start.input = block.input;
                self.emit(Event::ContentBlockStart(start)).await
            }
            "web_search_tool_result" => {
                start.tool_use_id = block.tool_use_id;
                self.emit(Event::ContentBlockStart(start)).await
            }
            other => Err(LlmError::Protocol(format!(
                "unsupported content_block_start block: {other}"
            ))),
        }
    }

    fn apply_usage(&self, state: &mut StreamState, wire: &WireUsage) {
        if let Some(tokens) = wire.input_tokens {
            state.usage.input_tokens = tokens;
        }
        if let Some(tokens) = wire.output_tokens {
            state.usage.output_tokens = tokens;
        }
        if let Some(tokens) = wire.cache_read_input_tokens {
            state.usage.cache_read_tokens = tokens;
        }
        if let Some(tokens) = wire.cache_creation_input_tokens {
            state.usage.cache_write_tokens = tokens;
        }
        state.usage.total_tokens = state.usage.token_count();
        state.usage.cost_usd = match &self.pricing {
            Some(pricing) => calculate_cost(&state.usage, pricing),
            None => 0.0,
        };
    }

    async fn emit(&self, event: Event) -> Result<(), LlmError> {
        if send_event(&self.cancel, &self.tx, event).await {
            Ok(())
        } else {
            Err(LlmError::Aborted)
        }
    }
}

fn abort_event(state: &StreamState) -> Event {
    Event::Error {
        done: DonePayload {
            reason: StopReason::Aborted,
            usage: state.usage.clone(),
        },
        message: "stream aborted".to_string(),
    }
}

/// Validate reassembled tool arguments: empty defaults to `{}`, anything
/// else must parse as a JSON object.
fn finalize_tool_arguments(buffer: &str) -> Result<Value, LlmError> {
    let trimmed = buffer.trim();
    if trimmed.is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    let value: Value = serde_json::from_str(trimmed)
        .map_err(|_| LlmError::Protocol("tool_call arguments are not valid JSON".to_string()))?;
    if !value.is_object() {
        return Err(LlmError::Protocol(
            "tool_call arguments are not a JSON object".to_string(),
        ));
    }
    Ok(value)
}

/// Map Anthropic stop reasons to canonical values.
fn map_stop_reason(reason: &str) -> Result<StopReason, LlmError> {
    match reason {
        "end_turn" | "stop_sequence" | "pause_turn" => Ok(StopReason::Stop),
        "max_tokens" => Ok(StopReason::Length),
        "tool_use" => Ok(StopReason::ToolUse),
        "refusal" | "sensitive" => Ok(StopReason::Error),
        other => Err(LlmError::Protocol(format!("unhandled stop reason: {other}"))),
    }
}

// ============================================================================
// Wire Request
// ============================================================================

#[derive(Debug, serde::Serialize)]
struct WireRequest {
    model: String,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireRequestMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<WireMetadata>,
}

#[derive(Debug, serde::Serialize)]
struct WireRequestMessage {
    role: &'static str,
    content: Vec<WireBlock>,
}

#[derive(Debug, serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

#[derive(Debug, serde::Serialize)]
struct WireTool {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    input_schema: Value,
}

#[derive(Debug, serde::Serialize)]
struct WireMetadata {
    user_id: String,
}

fn to_wire_request(req: &Request) -> Result<WireRequest, LlmError> {
    let max_tokens = if req.max_tokens == 0 {
        DEFAULT_MAX_TOKENS
    } else {
        req.max_tokens
    };

    let mut messages = Vec::with_capacity(req.messages.len());
    let mut i = 0;
    while i < req.messages.len() {
        let msg = &req.messages[i];
        match msg.role {
            Role::User => {
                let blocks = text_blocks(msg);
                if !blocks.is_empty() {
                    messages.push(WireRequestMessage {
                        role: "user",
                        content: blocks,
                    });
                }
                i += 1;
            }
            Role::Assistant => {
                let mut blocks = text_blocks(msg);
                for call in &msg.tool_calls {
                    if call.id.trim().is_empty() || call.name.trim().is_empty() {
                        continue;
                    }
                    blocks.push(WireBlock::ToolUse {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        input: object_or_empty(&call.arguments),
                    });
                }
                if !blocks.is_empty() {
                    messages.push(WireRequestMessage {
                        role: "assistant",
                        content: blocks,
                    });
                }
                i += 1;
            }
            Role::Tool => {
                // Consecutive tool results become one user message.
                let mut blocks = Vec::new();
                while i < req.messages.len() && req.messages[i].role == Role::Tool {
                    if let Some(result) = &req.messages[i].tool_result {
                        if result.tool_call_id.trim().is_empty() {
                            return Err(LlmError::InvalidRequest(
                                "tool result missing tool_call_id".to_string(),
                            ));
                        }
                        blocks.push(WireBlock::ToolResult {
                            tool_use_id: result.tool_call_id.clone(),
                            content: result.content.clone(),
                            is_error: result.is_error,
                        });
                    }
                    i += 1;
                }
                if !blocks.is_empty() {
                    messages.push(WireRequestMessage {
                        role: "user",
                        content: blocks,
                    });
                }
            }
        }
    }

    let tools = if req.tools.is_empty() {
        None
    } else {
        let mut out = Vec::with_capacity(req.tools.len());
        for spec in &req.tools {
            let schema = decode_tool_schema(&spec.schema).map_err(|e| {
                LlmError::InvalidRequest(format!("decode tool schema for {:?}: {e}", spec.name))
            })?;
            out.push(WireTool {
                name: spec.name.clone(),
                description: if spec.description.trim().is_empty() {
                    None
                } else {
                    Some(spec.description.clone())
                },
                input_schema: serde_json::json!({
                    "type": schema.schema_type,
                    "properties": schema.properties,
                    "required": schema.required,
                }),
            });
        }
        Some(out)
    };

    let tool_choice = req.tool_choice.as_ref().map(|choice| match choice {
        ToolChoice::Auto => serde_json::json!({"type": "auto"}),
        ToolChoice::Any => serde_json::json!({"type": "any"}),
        ToolChoice::None => serde_json::json!({"type": "none"}),
        ToolChoice::Tool { name } => serde_json::json!({"type": "tool", "name": name}),
    });

    let metadata = req
        .metadata
        .get("user_id")
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .map(|id| WireMetadata {
            user_id: id.to_string(),
        });

    Ok(WireRequest {
        model: req.model.clone(),
        max_tokens,
        stream: true,
        system: if req.system.trim().is_empty() {
            None
        } else {
            Some(req.system.clone())
        },
        messages,
        temperature: req.temperature,
        tools,
        tool_choice,
        metadata,
    })
}

fn text_blocks(msg: &Message) -> Vec<WireBlock> {
    msg.content
        .iter()
        .filter_map(|block| match block {
            super::types::ContentBlock::Text { text } if !text.is_empty() => {
                Some(WireBlock::Text { text: text.clone() })
            }
            _ => None,
        })
        .collect()
}

fn object_or_empty(value: &Value) -> Value {
    if value.is_object() {
        value.clone()
    } else {
        tracing::warn!("tool call arguments are not a JSON object, using empty object");
        Value::Object(serde_json::Map::new())
    }
}

// ============================================================================
// Wire Events
// ============================================================================

#[derive(Debug, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireEvent {
    MessageStart {
        message: WireMessageStart,
    },
    ContentBlockStart {
        index: u64,
        content_block: WireContentBlock,
    },
    ContentBlockDelta {
        index: u64,
        delta: WireDelta,
    },
    ContentBlockStop {
        index: u64,
    },
    MessageDelta {
        #[serde(default)]
        delta: Option<WireMessageDelta>,
        #[serde(default)]
        usage: Option<WireUsage>,
    },
    MessageStop,
    Error {
        error: WireApiError,
    },
    Ping,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, serde::Deserialize)]
struct WireMessageStart {
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, serde::Deserialize)]
struct WireContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    tool_use_id: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thinking: Option<String>,
    #[serde(default)]
    signature: Option<String>,
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    input: Option<Value>,
}

#[derive(Debug, serde::Deserialize)]
struct WireDelta {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    partial_json: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct WireMessageDelta {
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct WireUsage {
    #[serde(default)]
    input_tokens: Option<u64>,
    #[serde(default)]
    output_tokens: Option<u64>,
    #[serde(default)]
    cache_read_input_tokens: Option<u64>,
    #[serde(default)]
    cache_creation_input_tokens: Option<u64>,
}

#[derive(Debug, serde::Deserialize)]
struct WireApiError {
    #[serde(rename = "type", default)]
    error_type: String,
    #[serde(default)]
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::{ToolResult, ToolSpec};
    use serde_json::json;

    #[test]
    fn stop_reason_mapping() {
        assert_eq!(map_stop_reason("end_turn").unwrap(), StopReason::Stop);
        assert_eq!(map_stop_reason("stop_sequence").unwrap(), StopReason::Stop);
        assert_eq!(map_stop_reason("max_tokens").unwrap(), StopReason::Length);
        assert_eq!(map_stop_reason("tool_use").unwrap(), StopReason::ToolUse);
        assert_eq!(map_stop_reason("refusal").unwrap(), StopReason::Error);
        assert!(map_stop_reason("weird").is_err());
    }

    #[test]
    fn finalize_arguments_defaults_empty_to_object() {
        assert_eq!(finalize_tool_arguments("").unwrap(), json!({}));
        assert_eq!(finalize_tool_arguments("  ").unwrap(), json!({}));
    }

    #[test]
    fn finalize_arguments_rejects_invalid_json() {
        assert!(finalize_tool_arguments("{\"path\":").is_err());
        assert!(finalize_tool_arguments("[1,2]").is_err());
    }

    #[test]
    fn finalize_arguments_parses_reassembled_object() {
        let args = finalize_tool_arguments("{\"path\":\"main.go\"}").unwrap();
        assert_eq!(args, json!({"path": "main.go"}));
    }

    #[test]
    fn wire_request_defaults_max_tokens() {
        let req = Request {
            model: "claude-sonnet-4-20250514".to_string(),
            messages: vec![Message::user("hi")],
            ..Request::default()
        };
        let wire = to_wire_request(&req).unwrap();
        assert_eq!(wire.max_tokens, DEFAULT_MAX_TOKENS);
        assert!(wire.stream);
        assert!(wire.system.is_none());
    }

    #[test]
    fn wire_request_maps_assistant_tool_calls() {
        let mut msg = Message::assistant("thinking about it");
        msg.tool_calls
            .push(ToolCall::new("toolu_1", "read", json!({"path": "a.rs"})));
        let req = Request {
            model: "claude-sonnet-4-20250514".to_string(),
            messages: vec![msg],
            ..Request::default()
        };
        let wire = to_wire_request(&req).unwrap();
        assert_eq!(wire.messages.len(), 1);
        assert_eq!(wire.messages[0].role, "assistant");
        assert_eq!(wire.messages[0].content.len(), 2);
        let json = serde_json::to_value(&wire.messages[0]).unwrap();
        assert_eq!(json["content"][1]["type"], "tool_use");
        assert_eq!(json["content"][1]["id"], "toolu_1");
    }

    #[test]
    fn wire_request_groups_consecutive_tool_results() {
        let result = |id: &str| {
            Message::tool_result(ToolResult {
                tool_call_id: id.to_string(),
                tool_name: "read".to_string(),
                content: "ok".to_string(),
                is_error: false,
            })
        };
        let req = Request {
            model: "claude-sonnet-4-20250514".to_string(),
            messages: vec![result("call-1"), result("call-2"), Message::user("next")],
            ..Request::default()
        };
        let wire = to_wire_request(&req).unwrap();
        assert_eq!(wire.messages.len(), 2);
        assert_eq!(wire.messages[0].role, "user");
        assert_eq!(wire.messages[0].content.len(), 2);
        let json = serde_json::to_value(&wire.messages[0]).unwrap();
        assert_eq!(json["content"][0]["tool_use_id"], "call-1");
        assert_eq!(json["content"][1]["tool_use_id"], "call-2");
    }

    #[test]
    fn wire_request_rejects_tool_result_without_id() {
        let req = Request {
            model: "claude-sonnet-4-20250514".to_string(),
            messages: vec![Message::tool_result(ToolResult {
                tool_call_id: " ".to_string(),
                tool_name: "read".to_string(),
                content: "ok".to_string(),
                is_error: false,
            })],
            ..Request::default()
        };
        assert!(matches!(
            to_wire_request(&req),
            Err(LlmError::InvalidRequest(_))
        ));
    }

    #[test]
    fn wire_request_normalizes_tool_schemas() {
        let req = Request {
            model: "claude-sonnet-4-20250514".to_string(),
            messages: vec![Message::user("hi")],
            tools: vec![ToolSpec {
                name: "read".to_string(),
                description: "Read a file".to_string(),
                schema: json!({"properties": {"path": {"type": "string"}}, "required": ["path"]}),
            }],
            ..Request::default()
        };
        let wire = to_wire_request(&req).unwrap();
        let tools = wire.tools.unwrap();
        assert_eq!(tools[0].input_schema["type"], "object");
        assert_eq!(tools[0].input_schema["required"][0], "path");
    }

    #[test]
    fn wire_event_parses_tagged_payloads() {
        let event: WireEvent = serde_json::from_str(
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"tool_use","id":"toolu_1","name":"Read","input":{}}}"#,
        )
        .unwrap();
        match event {
            WireEvent::ContentBlockStart {
                index,
                content_block,
            } => {
                assert_eq!(index, 0);
                assert_eq!(content_block.block_type, "tool_use");
                assert_eq!(content_block.id.as_deref(), Some("toolu_1"));
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let event: WireEvent = serde_json::from_str(
            r#"{"type":"message_delta","delta":{"stop_reason":"tool_use"},"usage":{"output_tokens":7}}"#,
        )
        .unwrap();
        match event {
            WireEvent::MessageDelta { delta, usage } => {
                assert_eq!(delta.unwrap().stop_reason.as_deref(), Some("tool_use"));
                assert_eq!(usage.unwrap().output_tokens, Some(7));
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let event: WireEvent = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(event, WireEvent::Ping));

        let event: WireEvent = serde_json::from_str(r#"{"type":"something_new"}"#).unwrap();
        assert!(matches!(event, WireEvent::Unknown));
    }

    #[test]
    fn tool_result_block_omits_is_error_when_false() {
        let block = WireBlock::ToolResult {
            tool_use_id: "call-1".to_string(),
            content: "ok".to_string(),
            is_error: false,
        };
        let json = serde_json::to_value(&block).unwrap();
        assert!(json.get("is_error").is_none());

        let block = WireBlock::ToolResult {
            tool_use_id: "call-1".to_string(),
            content: "bad".to_string(),
            is_error: true,
        };
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["is_error"], true);
    }
}
