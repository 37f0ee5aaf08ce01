//! Retry policy and exponential backoff for streaming requests.
//!
//! Retries apply only while no visible output has crossed to the consumer;
//! the provider stream loop consults [`crate::llm::error::LlmError::is_retryable`]
//! and its own visibility flag before sleeping here.

use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(300);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(5);

/// Retry/backoff configuration. Unset fields fall back to defaults when the
/// policy is resolved; `Some(0)` retries explicitly disables retrying.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: Option<u32>,
    pub base_delay: Option<Duration>,
    pub max_delay: Option<Duration>,
}

/// A fully-resolved retry policy with every field populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Fill unset fields with defaults and enforce `max_delay >= base_delay`.
    pub fn resolve(self) -> ResolvedRetryPolicy {
        let base_delay = self.base_delay.unwrap_or(DEFAULT_BASE_DELAY);
        let mut max_delay = self.max_delay.unwrap_or(DEFAULT_MAX_DELAY);
        if max_delay < base_delay {
            max_delay = base_delay;
        }
        ResolvedRetryPolicy {
            max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            base_delay,
            max_delay,
        }
    }

    /// Overlay request-level overrides on top of a provider default policy.
    pub fn merge(base: RetryPolicy, overlay: RetryPolicy) -> ResolvedRetryPolicy {
        RetryPolicy {
            max_retries: overlay.max_retries.or(base.max_retries),
            base_delay: overlay.base_delay.or(base.base_delay),
            max_delay: overlay.max_delay.or(base.max_delay),
        }
        .resolve()
    }
}

impl ResolvedRetryPolicy {
    /// Exponential backoff with ±20 % jitter for a zero-based retry attempt,
    /// clamped to `max_delay`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let mut delay = self.base_delay;
        for _ in 0..attempt {
            delay = delay.saturating_mul(2);
            if delay >= self.max_delay {
                delay = self.max_delay;
                break;
            }
        }
        let jitter = rand::thread_rng().gen_range(0.8..1.2);
        let jittered = delay.mul_f64(jitter);
        jittered.min(self.max_delay)
    }
}

/// Sleep for `delay` unless the token is cancelled first.
///
/// Returns `false` when the sleep was interrupted by cancellation.
pub async fn sleep_unless_cancelled(cancel: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
