//! The multi-turn agent loop: drive the provider, forward its events,
//! execute tool calls, and continue until a non-tool terminal.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::error::AgentError;
use super::queues::MessageQueues;
use super::state::{AgentState, RunState};
use crate::llm::types::{
    ContentBlock, DonePayload, Event, Message, Request, StopReason, ToolCall, ToolResult,
};
use crate::llm::Provider;
use crate::tools::{ToolError, ToolRegistry};

const MAX_TOOL_RESULT_CHARS: usize = 10_000;
const TOOL_RESULT_HEAD_CHARS: usize = 4_000;
const TOOL_RESULT_TAIL_CHARS: usize = 4_000;
const TOOL_RESULT_TRUNCATE_MARK: &str = "\n...[truncated]...\n";

pub const SKIPPED_TOOL_CALL_MESSAGE: &str = "Skipped due to queued user message.";

/// Everything one run needs, cloned out of the agent before spawning.
pub(crate) struct LoopContext {
    pub provider: Arc<dyn Provider>,
    pub registry: Option<Arc<ToolRegistry>>,
    pub queues: Arc<MessageQueues>,
    pub state: Arc<Mutex<RunState>>,
    pub max_turns: usize,
}

/// Run up to `max_turns` provider turns, forwarding every event to `out`.
///
/// On `Ok` a terminal event has been forwarded; on `Err` it has not, and
/// the caller owes the stream its single terminal.
pub(crate) async fn run_loop(
    ctx: &LoopContext,
    mut req: Request,
    cancel: &CancellationToken,
    out: &mpsc::UnboundedSender<Event>,
) -> Result<(), AgentError> {
    let max_turns = ctx.max_turns.max(1);

    let mut pending = ctx.queues.dequeue_steering();
    if pending.is_empty() {
        pending = ctx.queues.dequeue_follow_up();
    }

    for _turn in 0..max_turns {
        if !pending.is_empty() {
            for msg in &pending {
                send_loop_event(cancel, out, Event::QueuedMessage(msg.clone()))?;
            }
            req.messages.append(&mut pending);
        }

        let mut stream = ctx.provider.stream(&req, cancel).await?;
        let (terminal, assistant) = forward_provider_events(&mut stream, cancel, out).await?;
        if let Some(assistant_msg) = &assistant {
            req.messages.push(assistant_msg.clone());
        }

        let done = match terminal {
            // The provider already emitted its error terminal; it was
            // forwarded above.
            Event::Error { .. } => return Ok(()),
            Event::Done(done) => done,
            _ => unreachable!("forward_provider_events returns terminals only"),
        };

        if done.reason == StopReason::ToolUse {
            let (Some(registry), Some(assistant_msg)) = (&ctx.registry, &assistant) else {
                return Ok(());
            };
            if assistant_msg.tool_calls.is_empty() {
                return Ok(());
            }

            for (i, call) in assistant_msg.tool_calls.iter().enumerate() {
                send_loop_event(cancel, out, Event::ToolCallStart(call.clone()))?;

                let result = execute_tool_call(ctx, cancel, call).await?;
                req.messages.push(Message::tool_result(result.clone()));
                send_loop_event(cancel, out, Event::ToolResult(result))?;
                send_loop_event(cancel, out, Event::ToolCallEnd(call.clone()))?;

                let steering = ctx.queues.dequeue_steering();
                if !steering.is_empty() {
                    pending = steering;
                    for remaining in &assistant_msg.tool_calls[i + 1..] {
                        let skipped = skip_tool_call(remaining);
                        send_loop_event(cancel, out, Event::ToolCallStart(remaining.clone()))?;
                        req.messages.push(Message::tool_result(skipped.clone()));
                        send_loop_event(cancel, out, Event::ToolResult(skipped))?;
                        send_loop_event(cancel, out, Event::ToolCallEnd(remaining.clone()))?;
                    }
                    break;
                }
            }
            continue;
        }

        let steering = ctx.queues.dequeue_steering();
        if !steering.is_empty() {
            pending = steering;
            continue;
        }
        let follow_up = ctx.queues.dequeue_follow_up();
        if !follow_up.is_empty() {
            pending = follow_up;
            continue;
        }

        return Ok(());
    }

    Err(AgentError::MaxTurnsExceeded)
}

/// Forward one provider stream to `out`, accumulating the assistant
/// message, until its terminal event.
async fn forward_provider_events(
    stream: &mut mpsc::Receiver<Event>,
    cancel: &CancellationToken,
    out: &mpsc::UnboundedSender<Event>,
) -> Result<(Event, Option<Message>), AgentError> {
    let mut accumulator = AssistantAccumulator::default();

    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => return Err(AgentError::Aborted),
            received = stream.recv() => received,
        };
        let Some(event) = received else {
            return Err(AgentError::MissingTerminal);
        };

        send_loop_event(cancel, out, event.clone())?;
        accumulator.consume(&event);

        if event.is_terminal() {
            return Ok((event, accumulator.build_message()));
        }
    }
}

fn send_loop_event(
    cancel: &CancellationToken,
    out: &mpsc::UnboundedSender<Event>,
    event: Event,
) -> Result<(), AgentError> {
    if cancel.is_cancelled() {
        return Err(AgentError::Aborted);
    }
    out.send(event).map_err(|_| AgentError::Aborted)
}

async fn execute_tool_call(
    ctx: &LoopContext,
    cancel: &CancellationToken,
    call: &ToolCall,
) -> Result<ToolResult, AgentError> {
    let registry = ctx.registry.as_ref().expect("registry checked by caller");

    set_state(&ctx.state, AgentState::ToolExecuting);
    let executed = registry.execute(cancel, &call.name, &call.arguments).await;
    set_state(&ctx.state, AgentState::Streaming);

    let (content, is_error) = match executed {
        Ok(output) => {
            let mut content = output.content;
            let is_error = output.error.is_some();
            if let Some(failure) = output.error {
                if content.is_empty() {
                    content = format!("error: {failure}");
                } else {
                    content = format!("{content}\n\nerror: {failure}");
                }
            }
            if content.is_empty() {
                content = "ok".to_string();
            }
            (content, is_error)
        }
        Err(ToolError::Cancelled) => return Err(AgentError::Aborted),
        Err(err) => {
            if cancel.is_cancelled() {
                return Err(AgentError::Aborted);
            }
            (format!("error: {err}"), true)
        }
    };

    Ok(ToolResult {
        tool_call_id: call.id.clone(),
        tool_name: call.name.clone(),
        content: truncate_tool_result_content(&content),
        is_error,
    })
}

fn set_state(state: &Mutex<RunState>, next: AgentState) {
    state.lock().expect("state lock").state = next;
}

fn skip_tool_call(call: &ToolCall) -> ToolResult {
    ToolResult {
        tool_call_id: call.id.clone(),
        tool_name: call.name.clone(),
        content: SKIPPED_TOOL_CALL_MESSAGE.to_string(),
        is_error: true,
    }
}

/// Enforce the model-facing content cap: head + marker + tail.
pub(crate) fn truncate_tool_result_content(content: &str) -> String {
    let total_chars = content.chars().count();
    if total_chars <= MAX_TOOL_RESULT_CHARS {
        return content.to_string();
    }
    let head: String = content.chars().take(TOOL_RESULT_HEAD_CHARS).collect();
    let tail: String = {
        let skip = total_chars - TOOL_RESULT_TAIL_CHARS;
        content.chars().skip(skip).collect()
    };
    format!("{head}{TOOL_RESULT_TRUNCATE_MARK}{tail}")
}

/// Rebuilds the assistant message from forwarded events: text from block
/// starts and deltas, tool calls upserted by id in provider order.
#[derive(Default)]
struct AssistantAccumulator {
    text: String,
    call_order: Vec<String>,
    calls_by_id: std::collections::HashMap<String, ToolCall>,
}

impl AssistantAccumulator {
    fn consume(&mut self, event: &Event) {
        match event {
            Event::ContentBlockStart(start) => {
                if start.block_type == "text" {
                    if let Some(text) = &start.text {
                        self.text.push_str(text);
                    }
                }
            }
            Event::TextDelta(delta) => self.text.push_str(delta),
            Event::ToolCallStart(call) | Event::ToolCallEnd(call) => self.upsert(call),
            _ => {}
        }
    }

    fn upsert(&mut self, call: &ToolCall) {
        if !self.calls_by_id.contains_key(&call.id) {
            self.call_order.push(call.id.clone());
        }
        self.calls_by_id.insert(call.id.clone(), call.clone());
    }

    fn build_message(&self) -> Option<Message> {
        let tool_calls: Vec<ToolCall> = self
            .call_order
            .iter()
            .filter_map(|id| self.calls_by_id.get(id).cloned())
            .collect();

        if self.text.is_empty() && tool_calls.is_empty() {
            return None;
        }

        let content = if self.text.is_empty() {
            Vec::new()
        } else {
            vec![ContentBlock::text(self.text.clone())]
        };
        Some(Message {
            role: crate::llm::Role::Assistant,
            content,
            tool_calls,
            tool_result: None,
        })
    }
}

/// The final payload for a loop-level failure.
pub(crate) fn loop_error_event(err: &AgentError) -> Event {
    let reason = match err {
        AgentError::Aborted => StopReason::Aborted,
        _ => StopReason::Error,
    };
    Event::Error {
        done: DonePayload {
            reason,
            usage: crate::llm::Usage::default(),
        },
        message: err.to_string(),
    }
}
