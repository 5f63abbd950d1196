//! Bounded retry for transient model failures.

use std::time::Duration;

use tracing::warn;

use gemini_chat_core::config::Config;
use gemini_chat_core::types::TurnContent;
use gemini_chat_providers::{ModelSession, ProviderError, TurnStream};

/// Attempts per turn and the linear backoff between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Wait after failed attempt `k` is `base_delay * k`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.max_attempts(),
            base_delay: Duration::from_millis(config.retry_delay_ms()),
        }
    }

    /// Delay before the attempt that follows failed attempt `attempt` (1-based).
    /// Saturates at `Duration::MAX`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.checked_mul(attempt).unwrap_or(Duration::MAX)
    }
}

/// Start a turn, retrying while the model reports overload.
///
/// The same `content` is resent on every attempt. Non-transient errors and the
/// final transient one are returned as-is.
pub async fn send_with_retry(
    session: &mut dyn ModelSession,
    content: &TurnContent,
    policy: &RetryPolicy,
) -> Result<TurnStream, ProviderError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match session.send_turn(content).await {
            Ok(stream) => return Ok(stream),
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Model overloaded, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
