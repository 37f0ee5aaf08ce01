//! Shared test utilities.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use gar::llm::mock::MockProvider;
use gar::llm::types::{DonePayload, Event, StopReason, ToolCall, Usage};
use gar::llm::EventReceiver;
use gar::tools::{DisplayData, Tool, ToolError, ToolOutput, ToolRegistry};

/// Drain a run's event stream to completion.
pub async fn collect_events(mut rx: EventReceiver) -> Vec<Event> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

/// The single terminal event of a drained stream.
pub fn terminal_of(events: &[Event]) -> &Event {
    let terminals: Vec<&Event> = events.iter().filter(|e| e.is_terminal()).collect();
    assert_eq!(terminals.len(), 1, "expected exactly one terminal: {events:?}");
    assert!(
        events.last().expect("nonempty stream").is_terminal(),
        "terminal must be last: {events:?}"
    );
    terminals[0]
}

pub fn done(reason: StopReason) -> Event {
    Event::Done(DonePayload {
        reason,
        usage: Usage::default(),
    })
}

/// Scripted provider turn: text only.
pub fn text_turn(text: &str, reason: StopReason) -> Vec<Event> {
    vec![
        Event::Start,
        Event::TextDelta(text.to_string()),
        done(reason),
    ]
}

/// Scripted provider turn ending in tool use.
pub fn tool_turn(calls: &[(&str, &str, Value)]) -> Vec<Event> {
    let mut events = vec![Event::Start];
    for (id, name, args) in calls {
        events.push(Event::ToolCallStart(ToolCall::new(*id, *name, json!({}))));
        events.push(Event::ToolCallEnd(ToolCall::new(*id, *name, args.clone())));
    }
    events.push(done(StopReason::ToolUse));
    events
}

/// A provider scripted per turn.
pub fn scripted_provider(scripts: Vec<Vec<Event>>) -> Arc<MockProvider> {
    Arc::new(MockProvider::with_scripts(scripts))
}

/// A tool that echoes its parameters and records invocations.
pub struct EchoTool {
    pub calls: std::sync::Mutex<Vec<Value>>,
}

impl EchoTool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: std::sync::Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }
    fn description(&self) -> String {
        "Echo parameters back".to_string()
    }
    fn schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }
    async fn execute(
        &self,
        _cancel: &CancellationToken,
        params: &Value,
    ) -> Result<ToolOutput, ToolError> {
        self.calls.lock().unwrap().push(params.clone());
        Ok(ToolOutput {
            content: format!("echo: {params}"),
            display: DisplayData::default(),
            error: None,
        })
    }
}

/// A registry holding one echo tool.
pub fn echo_registry() -> (Arc<ToolRegistry>, Arc<EchoTool>) {
    let registry = Arc::new(ToolRegistry::new());
    let tool = EchoTool::new();
    registry.register(tool.clone()).unwrap();
    (registry, tool)
}
