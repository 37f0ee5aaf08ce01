//! Server-Sent Events decoding for provider byte streams.
//!
//! A single stream adapter buffers incoming bytes, splits lines (both `\n`
//! and `\r\n`), and assembles `data:`/`event:` fields into events at blank
//! lines. Providers decode the JSON payloads themselves.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;

/// One assembled SSE event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SseEvent {
    /// The `event:` field, when present.
    pub event: Option<String>,
    /// Joined `data:` lines.
    pub data: String,
}

/// Decodes a byte stream into [`SseEvent`]s.
pub struct SseDecoder<S> {
    inner: S,
    buffer: String,
    event_name: Option<String>,
    data_lines: Vec<String>,
    done: bool,
}

impl<S> SseDecoder<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            buffer: String::new(),
            event_name: None,
            data_lines: Vec::new(),
            done: false,
        }
    }

    fn take_line(&mut self) -> Option<String> {
        let end = self.buffer.find('\n')?;
        let mut line: String = self.buffer.drain(..=end).collect();
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
        Some(line)
    }

    /// Consume one line; returns an event when a blank line closes one.
    fn consume_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            if self.event_name.is_none() && self.data_lines.is_empty() {
                return None;
            }
            return Some(self.flush());
        }
        if let Some(value) = strip_field(line, "data:") {
            self.data_lines.push(value.to_string());
        } else if let Some(value) = strip_field(line, "event:") {
            self.event_name = Some(value.to_string());
        }
        // Comments (`:`-prefixed), `id:`, `retry:`, and unknown fields are
        // ignored; none of the supported providers use them.
        None
    }

    fn flush(&mut self) -> SseEvent {
        SseEvent {
            event: self.event_name.take(),
            data: std::mem::take(&mut self.data_lines).join("\n"),
        }
    }

    fn has_pending(&self) -> bool {
        self.event_name.is_some() || !self.data_lines.is_empty()
    }
}

fn strip_field<'a>(line: &'a str, field: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(field)?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

impl<S, E> Stream for SseDecoder<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<SseEvent, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }

        loop {
            while let Some(line) = self.take_line() {
                if let Some(event) = self.consume_line(&line) {
                    return Poll::Ready(Some(Ok(event)));
                }
            }

            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    if let Ok(text) = std::str::from_utf8(&bytes) {
                        self.buffer.push_str(text);
                    }
                }
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Some(Err(e))),
                Poll::Ready(None) => {
                    self.done = true;
                    // A final line without trailing newline still counts.
                    if !self.buffer.is_empty() {
                        let line = std::mem::take(&mut self.buffer);
                        if let Some(event) = self.consume_line(&line) {
                            return Poll::Ready(Some(Ok(event)));
                        }
                    }
                    if self.has_pending() {
                        let event = self.flush();
                        return Poll::Ready(Some(Ok(event)));
                    }
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn bytes_stream(chunks: Vec<&str>) -> impl Stream<Item = Result<Bytes, std::convert::Infallible>> {
        futures::stream::iter(chunks.into_iter().map(|s| Ok(Bytes::from(s.to_string()))))
    }

    #[tokio::test]
    async fn assembles_event_with_name_and_data() {
        let stream = bytes_stream(vec!["event: message_start\n", "data: {\"a\":1}\n", "\n"]);
        let mut decoder = SseDecoder::new(stream);

        let event = decoder.next().await.unwrap().unwrap();
        assert_eq!(event.event.as_deref(), Some("message_start"));
        assert_eq!(event.data, "{\"a\":1}");
        assert!(decoder.next().await.is_none());
    }

    #[tokio::test]
    async fn joins_multiline_data() {
        let stream = bytes_stream(vec!["data: hello\n", "data: world\n", "\n"]);
        let mut decoder = SseDecoder::new(stream);

        let event = decoder.next().await.unwrap().unwrap();
        assert_eq!(event.data, "hello\nworld");
        assert!(event.event.is_none());
    }

    #[tokio::test]
    async fn handles_chunked_lines_and_crlf() {
        let stream = bytes_stream(vec!["dat", "a: hel", "lo\r\n", "\r\n"]);
        let mut decoder = SseDecoder::new(stream);

        let event = decoder.next().await.unwrap().unwrap();
        assert_eq!(event.data, "hello");
    }

    #[tokio::test]
    async fn data_without_space_after_colon() {
        let stream = bytes_stream(vec!["data:no-space\n\n"]);
        let mut decoder = SseDecoder::new(stream);

        let event = decoder.next().await.unwrap().unwrap();
        assert_eq!(event.data, "no-space");
    }

    #[tokio::test]
    async fn ignores_comments_and_unknown_fields() {
        let stream = bytes_stream(vec![": keepalive\n", "id: 7\n", "data: x\n", "\n"]);
        let mut decoder = SseDecoder::new(stream);

        let event = decoder.next().await.unwrap().unwrap();
        assert_eq!(event.data, "x");
    }

    #[tokio::test]
    async fn emits_pending_event_on_eof_without_blank_line() {
        let stream = bytes_stream(vec!["data: final"]);
        let mut decoder = SseDecoder::new(stream);

        let event = decoder.next().await.unwrap().unwrap();
        assert_eq!(event.data, "final");
        assert!(decoder.next().await.is_none());
    }

    #[tokio::test]
    async fn multiple_events_in_sequence() {
        let stream = bytes_stream(vec!["data: one\n\ndata: two\n\ndata: three\n\n"]);
        let mut decoder = SseDecoder::new(stream);

        for expected in ["one", "two", "three"] {
            let event = decoder.next().await.unwrap().unwrap();
            assert_eq!(event.data, expected);
        }
        assert!(decoder.next().await.is_none());
    }

    #[tokio::test]
    async fn blank_lines_without_content_are_skipped() {
        let stream = bytes_stream(vec!["\n\n", "data: payload\n", "\n"]);
        let mut decoder = SseDecoder::new(stream);

        let event = decoder.next().await.unwrap().unwrap();
        assert_eq!(event.data, "payload");
        assert!(decoder.next().await.is_none());
    }

    #[tokio::test]
    async fn empty_stream_yields_nothing() {
        let stream = bytes_stream(vec![]);
        let mut decoder = SseDecoder::new(stream);
        assert!(decoder.next().await.is_none());
    }
}
