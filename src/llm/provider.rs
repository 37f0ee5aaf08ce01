//! The streaming provider contract and channel send helpers.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::error::LlmError;
use super::types::{Event, Request, Role, ToolChoice};

/// Capacity of provider event channels. One slot is enough: the terminal
/// event slot must be available so a stream task can always finish without
/// blocking on an abandoned consumer.
pub const EVENT_CHANNEL_CAPACITY: usize = 1;

/// Receiving half of one provider stream.
pub type EventReceiver = mpsc::Receiver<Event>;

/// Streams model events for a single request.
///
/// Implementations return the receiver immediately and run the HTTP stream
/// in a background task. Validation failures are returned synchronously,
/// before any event is emitted.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn stream(
        &self,
        req: &Request,
        cancel: &CancellationToken,
    ) -> Result<EventReceiver, LlmError>;
}

/// Validate the canonical request shape shared by all providers.
pub fn validate_request(req: &Request) -> Result<(), LlmError> {
    if req.model.trim().is_empty() {
        return Err(LlmError::InvalidRequest("model is required".to_string()));
    }
    if let Some(ToolChoice::Tool { name }) = &req.tool_choice {
        if name.trim().is_empty() {
            return Err(LlmError::InvalidRequest(
                "tool_choice of type tool requires a name".to_string(),
            ));
        }
    }
    for msg in &req.messages {
        if msg.role == Role::Tool && msg.tool_result.is_none() {
            return Err(LlmError::InvalidRequest(
                "tool message missing tool_result".to_string(),
            ));
        }
    }
    Ok(())
}

/// Forward an event unless cancellation wins first.
///
/// Returns `false` when the send was interrupted (cancelled, or the
/// consumer dropped the receiver); the caller should stop streaming.
pub(crate) async fn send_event(
    cancel: &CancellationToken,
    tx: &mpsc::Sender<Event>,
    event: Event,
) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        sent = tx.send(event) => sent.is_ok(),
    }
}

/// How long a terminal event may wait for channel capacity before being
/// dropped so the stream task can exit.
pub(crate) const TERMINAL_FLUSH_WAIT: std::time::Duration = std::time::Duration::from_millis(100);

/// Emit a terminal event without risking a hang: a live consumer gets it
/// within the flush window, an abandoned one forfeits it.
pub(crate) async fn send_terminal(tx: &mpsc::Sender<Event>, event: Event) {
    let _ = tokio::time::timeout(TERMINAL_FLUSH_WAIT, tx.send(event)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::Message;

    #[test]
    fn validate_rejects_empty_model() {
        let req = Request::default();
        assert!(matches!(
            validate_request(&req),
            Err(LlmError::InvalidRequest(_))
        ));
    }

    #[test]
    fn validate_rejects_unnamed_tool_choice() {
        let req = Request {
            model: "claude-sonnet-4-20250514".to_string(),
            tool_choice: Some(ToolChoice::Tool {
                name: "  ".to_string(),
            }),
            ..Request::default()
        };
        assert!(matches!(
            validate_request(&req),
            Err(LlmError::InvalidRequest(_))
        ));
    }

    #[test]
    fn validate_accepts_minimal_request() {
        let req = Request {
            model: "claude-sonnet-4-20250514".to_string(),
            messages: vec![Message::user("hi")],
            ..Request::default()
        };
        assert!(validate_request(&req).is_ok());
    }

    #[tokio::test]
    async fn send_event_aborts_on_cancellation() {
        let cancel = CancellationToken::new();
        let (tx, _rx) = mpsc::channel(1);
        // Fill the buffer so the next send would block.
        tx.send(Event::Start).await.unwrap();
        cancel.cancel();
        assert!(!send_event(&cancel, &tx, Event::Start).await);
    }

    #[tokio::test]
    async fn send_terminal_waits_for_live_consumer() {
        let (tx, mut rx) = mpsc::channel(1);
        tx.send(Event::Start).await.unwrap();
        let consumer = tokio::spawn(async move {
            let mut seen = 0;
            while rx.recv().await.is_some() {
                seen += 1;
            }
            seen
        });
        send_terminal(&tx, Event::Start).await;
        drop(tx);
        assert_eq!(consumer.await.unwrap(), 2);
    }

    #[tokio::test]
    async fn send_terminal_gives_up_on_stuck_consumer() {
        let (tx, _rx) = mpsc::channel(1);
        tx.send(Event::Start).await.unwrap();
        // Buffer full and nobody reading: the terminal is dropped after the
        // flush window instead of blocking forever.
        send_terminal(&tx, Event::Start).await;
    }
}
