use crate::settings::Retry;
use async_trait::async_trait;
use std::time::Duration;

/// Exponential backoff schedule for connection acquisition.
///
/// Attempt `n` (0-based) that fails is followed by a wait of
/// `initial_delay * backoff_factor^n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub backoff_factor: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            backoff_factor: 2,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            ..Self::default()
        }
    }

    pub fn from_settings(retry: &Retry) -> Self {
        Self {
            max_retries: retry.max_retries,
            initial_delay: Duration::from_millis(retry.initial_delay_ms),
            backoff_factor: retry.backoff_factor,
        }
    }

    /// Number of `acquire` attempts; a policy always makes at least one.
    pub fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_factor.max(1).saturating_pow(attempt);
        self.initial_delay.saturating_mul(factor)
    }

    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.attempts()).map(move |attempt| self.delay_for(attempt))
    }
}

/// Where backoff waits happen. Production code sleeps on the tokio timer;
/// tests record the requested delays instead.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
