use crate::utils::time::sleep_with_jitter;
use common::config::RetryConfig;
use std::future::Future;
use tracing::warn;

/// Bounded exponential backoff, testable apart from any real I/O.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, config.base_delay_ms)
    }

    /// Delay before retry number `attempt` (zero-based), doubling each time.
    pub fn delay_for(&self, attempt: u32) -> u64 {
        self.base_delay_ms.saturating_mul(1u64 << attempt.min(16))
    }
}

/// Run `operation` until it succeeds, retrying transient failures up to
/// `policy.max_attempts` extra times with jittered exponential backoff.
/// Non-transient errors are returned immediately.
pub async fn retry_with_backoff<T, F, Fut>(policy: &RetryPolicy, operation: F) -> common::Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = common::Result<T>>,
{
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if !e.is_transient() || attempt >= policy.max_attempts {
                    return Err(e);
                }

                let delay = policy.delay_for(attempt);
                warn!(attempt = attempt + 1, delay_ms = delay, error = %e, "Retrying after failure");
                sleep_with_jitter(delay, delay / 2).await;
                attempt += 1;
            }
        }
    }
}
