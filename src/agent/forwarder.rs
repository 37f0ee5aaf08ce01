//! Event forwarder decoupling the loop from its consumer.
//!
//! The loop writes to an unbounded internal channel; this task drains it
//! into the bounded output channel. An abandoned consumer therefore never
//! stalls loop teardown: once the input closes, remaining events are
//! flushed only while the output accepts within a short deadline, and the
//! residue is dropped.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::llm::Event;

pub(crate) const FORWARD_FLUSH_WAIT: Duration = Duration::from_millis(50);

pub(crate) async fn forward_events(
    mut input: mpsc::UnboundedReceiver<Event>,
    output: mpsc::Sender<Event>,
) {
    let mut queue: VecDeque<Event> = VecDeque::new();

    loop {
        if queue.is_empty() {
            match input.recv().await {
                Some(event) => queue.push_back(event),
                None => break,
            }
            continue;
        }

        tokio::select! {
            received = input.recv() => match received {
                Some(event) => queue.push_back(event),
                None => break,
            },
            permit = output.reserve() => match permit {
                Ok(permit) => permit.send(queue.pop_front().expect("queue is non-empty")),
                Err(_) => return,
            },
        }
    }

    while let Some(event) = queue.pop_front() {
        match tokio::time::timeout(FORWARD_FLUSH_WAIT, output.send(event)).await {
            Ok(Ok(())) => {}
            _ => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::{DonePayload, StopReason, Usage};

    fn text(event: &Event) -> String {
        match event {
            Event::TextDelta(text) => text.clone(),
            other => format!("{other:?}"),
        }
    }

    #[tokio::test]
    async fn preserves_order() {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, mut out_rx) = mpsc::channel(1);
        let task = tokio::spawn(forward_events(in_rx, out_tx));

        for i in 0..10 {
            in_tx.send(Event::TextDelta(format!("event-{i}"))).unwrap();
        }
        drop(in_tx);

        let mut seen = Vec::new();
        while let Some(event) = out_rx.recv().await {
            seen.push(text(&event));
        }
        assert_eq!(seen.len(), 10);
        for (i, value) in seen.iter().enumerate() {
            assert_eq!(value, &format!("event-{i}"));
        }
        task.await.unwrap();
    }

    #[tokio::test]
    async fn abandoned_consumer_does_not_stall() {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::channel(1);
        let task = tokio::spawn(forward_events(in_rx, out_tx));

        // Consumer walks away immediately.
        drop(out_rx);

        for _ in 0..100 {
            in_tx
                .send(Event::Done(DonePayload {
                    reason: StopReason::Stop,
                    usage: Usage::default(),
                }))
                .unwrap();
        }
        drop(in_tx);

        // The forwarder must finish promptly despite the dead output.
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("forwarder stalled")
            .unwrap();
    }

    #[tokio::test]
    async fn slow_consumer_gets_flush_window_then_drop() {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, mut out_rx) = mpsc::channel(1);
        let task = tokio::spawn(forward_events(in_rx, out_tx));

        for i in 0..5 {
            in_tx.send(Event::TextDelta(format!("e{i}"))).unwrap();
        }
        drop(in_tx);

        // Read one event, then stop reading; the rest are dropped after the
        // flush deadline rather than blocking forever.
        let first = out_rx.recv().await.unwrap();
        assert_eq!(text(&first), "e0");
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("forwarder stalled")
            .unwrap();
    }
}
