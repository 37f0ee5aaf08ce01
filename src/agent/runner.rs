//! The agent: one run at a time, queue controls, cancellation.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::error::AgentError;
use super::forwarder::forward_events;
use super::queues::{MessageQueues, QueueMode};
use super::run_loop::{LoopContext, loop_error_event, run_loop};
use super::state::{AgentState, RunState};
use crate::llm::provider::EVENT_CHANNEL_CAPACITY;
use crate::llm::{Event, EventReceiver, Message, Provider, Request, Role, StopReason};
use crate::tools::ToolRegistry;

const DEFAULT_MAX_TURNS: usize = 50;

/// Agent construction parameters.
pub struct AgentConfig {
    pub provider: Arc<dyn Provider>,
    /// Without a registry, tool-use terminals end the run.
    pub registry: Option<Arc<ToolRegistry>>,
    /// Zero selects the default of 50.
    pub max_turns: usize,
    pub steering_mode: QueueMode,
    pub follow_up_mode: QueueMode,
}

impl AgentConfig {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            registry: None,
            max_turns: 0,
            steering_mode: QueueMode::default(),
            follow_up_mode: QueueMode::default(),
        }
    }
}

/// Orchestrates the model/tool loop and exposes one forwarded event
/// stream per run.
pub struct Agent {
    provider: Arc<dyn Provider>,
    registry: Option<Arc<ToolRegistry>>,
    queues: Arc<MessageQueues>,
    max_turns: usize,
    run_state: Arc<Mutex<RunState>>,
}

impl Agent {
    pub fn new(config: AgentConfig) -> Self {
        let max_turns = if config.max_turns == 0 {
            DEFAULT_MAX_TURNS
        } else {
            config.max_turns
        };
        Self {
            provider: config.provider,
            registry: config.registry,
            queues: Arc::new(MessageQueues::new(
                config.steering_mode,
                config.follow_up_mode,
            )),
            max_turns,
            run_state: Arc::new(Mutex::new(RunState::default())),
        }
    }

    /// Start one run and return its forwarded event stream.
    ///
    /// Only one run may be active; a second call fails with
    /// [`AgentError::Busy`]. The stream always ends with exactly one
    /// terminal event, and the agent returns to idle even if the caller
    /// abandons the receiver.
    pub fn run(&self, req: Request) -> Result<EventReceiver, AgentError> {
        let run_cancel = CancellationToken::new();
        {
            let mut guard = self.run_state.lock().expect("state lock");
            if guard.state != AgentState::Idle {
                return Err(AgentError::Busy);
            }
            guard.state = AgentState::Streaming;
            guard.cancel = Some(run_cancel.clone());
        }

        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let forwarder = tokio::spawn(forward_events(internal_rx, out_tx));

        let ctx = LoopContext {
            provider: self.provider.clone(),
            registry: self.registry.clone(),
            queues: self.queues.clone(),
            state: self.run_state.clone(),
            max_turns: self.max_turns,
        };
        let run_state = self.run_state.clone();

        tokio::spawn(async move {
            if let Err(err) = run_loop(&ctx, req, &run_cancel, &internal_tx).await {
                let event = loop_error_event(&err);
                if matches!(
                    &event,
                    Event::Error { done, .. } if done.reason == StopReason::Error
                ) {
                    run_state.lock().expect("state lock").state = AgentState::Error;
                }
                let _ = internal_tx.send(event);
            }
            drop(internal_tx);
            let _ = forwarder.await;
            run_cancel.cancel();

            let mut guard = run_state.lock().expect("state lock");
            guard.cancel = None;
            guard.state = AgentState::Idle;
        });

        Ok(out_rx)
    }

    /// Resume a conversation using its existing context and queued
    /// messages, without appending a new user message first.
    pub fn continue_run(&self, req: Request) -> Result<EventReceiver, AgentError> {
        let Some(last) = req.messages.last() else {
            return Err(AgentError::NoMessagesToContinue);
        };
        if last.role == Role::Assistant && !self.has_queued_messages() {
            return Err(AgentError::ContinueFromAssistantTail);
        }
        self.run(req)
    }

    /// Request cancellation of the current run, if any.
    pub fn cancel(&self) {
        let token = self.run_state.lock().expect("state lock").cancel.clone();
        if let Some(token) = token {
            token.cancel();
        }
    }

    /// Queue a high-priority message for the next turn boundary.
    pub fn steer(&self, msg: Message) {
        self.queues.steer(msg);
    }

    /// Queue a low-priority message processed when steering is empty.
    pub fn follow_up(&self, msg: Message) {
        self.queues.follow_up(msg);
    }

    pub fn has_queued_messages(&self) -> bool {
        self.queues.has_queued()
    }

    pub fn clear_steering_queue(&self) {
        self.queues.clear_steering();
    }

    pub fn clear_follow_up_queue(&self) {
        self.queues.clear_follow_up();
    }

    pub fn clear_all_queues(&self) {
        self.queues.clear_all();
    }

    pub fn state(&self) -> AgentState {
        self.run_state.lock().expect("state lock").state
    }
}
