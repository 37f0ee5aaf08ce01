//! LLM provider error types.

use thiserror::Error;

/// Errors surfaced by streaming providers.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Missing or malformed request input. Surfaced synchronously, before
    /// any event is emitted.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Provider credentials are absent.
    #[error("missing api key")]
    MissingCredentials,

    /// HTTP transport failure.
    #[error("http request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Provider returned a non-success status.
    #[error("api error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Provider violated the stream grammar.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Stream ended before a terminal event was seen.
    #[error("stream ended without terminal event")]
    TruncatedStream,

    /// The stream was cancelled.
    #[error("stream aborted")]
    Aborted,
}

impl LlmError {
    /// Transient failures worth retrying before any visible output.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Request(_) | LlmError::TruncatedStream => true,
            LlmError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
