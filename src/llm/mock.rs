//! Scripted provider for deterministic tests.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::error::LlmError;
use super::provider::{EVENT_CHANNEL_CAPACITY, EventReceiver, Provider, send_terminal};
use super::types::{DonePayload, Event, Request, StopReason, Usage};

/// Emits one predefined event script per call to [`Provider::stream`].
///
/// With multiple scripts configured, successive calls consume them in order
/// (the last script repeats), which lets tests drive multi-turn runs.
pub struct MockProvider {
    scripts: Mutex<ScriptQueue>,
    /// Optional delay before each event, for cancellation tests.
    pub delay: Duration,
    /// Requests captured from each stream call.
    pub requests: Mutex<Vec<Request>>,
}

struct ScriptQueue {
    scripts: Vec<Vec<Event>>,
    next: usize,
}

impl MockProvider {
    /// A provider that replays a single script on every call.
    pub fn new(events: Vec<Event>) -> Self {
        Self::with_scripts(vec![events])
    }

    /// A provider that replays one script per turn.
    pub fn with_scripts(scripts: Vec<Vec<Event>>) -> Self {
        Self {
            scripts: Mutex::new(ScriptQueue { scripts, next: 0 }),
            delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Messages captured for the given stream call.
    pub fn captured_requests(&self) -> Vec<Request> {
        self.requests.lock().expect("requests lock").clone()
    }

    fn next_script(&self) -> Vec<Event> {
        let mut queue = self.scripts.lock().expect("scripts lock");
        let index = queue.next.min(queue.scripts.len().saturating_sub(1));
        if queue.next + 1 < queue.scripts.len() {
            queue.next += 1;
        }
        queue.scripts.get(index).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn stream(
        &self,
        req: &Request,
        cancel: &CancellationToken,
    ) -> Result<EventReceiver, LlmError> {
        self.requests.lock().expect("requests lock").push(req.clone());
        let events = self.next_script();
        let delay = self.delay;
        let cancel = cancel.clone();

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            for event in events {
                if delay > Duration::ZERO {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            send_terminal(&tx, aborted_event()).await;
                            return;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                tokio::select! {
                    _ = cancel.cancelled() => {
                        send_terminal(&tx, aborted_event()).await;
                        return;
                    }
                    sent = tx.send(event) => {
                        if sent.is_err() {
                            return;
                        }
                    }
                }
            }
        });
        Ok(rx)
    }
}

fn aborted_event() -> Event {
    Event::Error {
        done: DonePayload {
            reason: StopReason::Aborted,
            usage: Usage::default(),
        },
        message: "stream aborted".to_string(),
    }
}

/// A minimal scripted turn: start, one text delta, done.
pub fn text_turn(text: &str, reason: StopReason) -> Vec<Event> {
    vec![
        Event::Start,
        Event::TextDelta(text.to_string()),
        Event::Done(DonePayload {
            reason,
            usage: Usage::default(),
        }),
    ]
}
