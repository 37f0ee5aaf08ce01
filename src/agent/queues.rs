//! Steering and follow-up message queues.
//!
//! Two append-only FIFOs behind one mutex, separate from the session
//! engine's lock. Steering messages outrank follow-ups and may interrupt
//! tool execution between tools; follow-ups are consumed between turns
//! only. Messages are not persisted here; they become user entries when
//! the loop reports them via `queued_message` events.

use std::collections::VecDeque;
use std::sync::Mutex;

use super::error::AgentError;
use crate::llm::Message;

/// How queued messages are drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueMode {
    /// One message per turn.
    #[default]
    OneAtATime,
    /// The entire queue at once.
    All,
}

impl QueueMode {
    /// Parse a config string; empty selects the default.
    pub fn parse(mode: &str) -> Result<Self, AgentError> {
        match mode {
            "" | "one-at-a-time" => Ok(QueueMode::OneAtATime),
            "all" => Ok(QueueMode::All),
            other => Err(AgentError::InvalidQueueMode(other.to_string())),
        }
    }
}

#[derive(Default)]
struct Queues {
    steering: VecDeque<Message>,
    follow_up: VecDeque<Message>,
}

/// The paired steering/follow-up queues with their dequeue modes.
pub struct MessageQueues {
    inner: Mutex<Queues>,
    steering_mode: QueueMode,
    follow_up_mode: QueueMode,
}

impl MessageQueues {
    pub fn new(steering_mode: QueueMode, follow_up_mode: QueueMode) -> Self {
        Self {
            inner: Mutex::new(Queues::default()),
            steering_mode,
            follow_up_mode,
        }
    }

    /// Queue a high-priority message for the next turn boundary.
    pub fn steer(&self, msg: Message) {
        self.inner.lock().expect("queue lock").steering.push_back(msg);
    }

    /// Queue a low-priority message, consumed when steering is empty.
    pub fn follow_up(&self, msg: Message) {
        self.inner.lock().expect("queue lock").follow_up.push_back(msg);
    }

    /// Drain steering messages per the configured mode.
    pub fn dequeue_steering(&self) -> Vec<Message> {
        let mut inner = self.inner.lock().expect("queue lock");
        drain(&mut inner.steering, self.steering_mode)
    }

    /// Drain follow-up messages per the configured mode.
    pub fn dequeue_follow_up(&self) -> Vec<Message> {
        let mut inner = self.inner.lock().expect("queue lock");
        drain(&mut inner.follow_up, self.follow_up_mode)
    }

    /// Whether any message is queued, without draining.
    pub fn has_queued(&self) -> bool {
        let inner = self.inner.lock().expect("queue lock");
        !inner.steering.is_empty() || !inner.follow_up.is_empty()
    }

    pub fn clear_steering(&self) {
        self.inner.lock().expect("queue lock").steering.clear();
    }

    pub fn clear_follow_up(&self) {
        self.inner.lock().expect("queue lock").follow_up.clear();
    }

    pub fn clear_all(&self) {
        let mut inner = self.inner.lock().expect("queue lock");
        inner.steering.clear();
        inner.follow_up.clear();
    }
}

impl Default for MessageQueues {
    fn default() -> Self {
        Self::new(QueueMode::default(), QueueMode::default())
    }
}

fn drain(queue: &mut VecDeque<Message>, mode: QueueMode) -> Vec<Message> {
    if queue.is_empty() {
        return Vec::new();
    }
    match mode {
        QueueMode::All => queue.drain(..).collect(),
        QueueMode::OneAtATime => queue.pop_front().into_iter().collect(),
    }
}
