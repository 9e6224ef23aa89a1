use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::bank_store::BankError;
use crate::log_source_fetch;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub factor: u32,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Class banks: the primary source gets the most patience.
    pub fn class_source() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            factor: 2,
            max_delay: Duration::from_millis(5000),
        }
    }

    /// Personal and shared banks: fewer, cheaper retries.
    pub fn secondary_source() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            factor: 2,
            max_delay: Duration::from_millis(5000),
        }
    }

    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            factor: 1,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (zero based), capped at `max_delay`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let multiplier = self.factor.saturating_pow(retry);
        self.base_delay.saturating_mul(multiplier).min(self.max_delay)
    }

    /// Run `operation`, retrying transient failures. Index and permanent
    /// errors return immediately.
    pub async fn run<T, F, Fut>(&self, source: &str, mut operation: F) -> Result<T, BankError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BankError>>,
    {
        let mut retry = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && retry < self.max_retries => {
                    let delay = self.delay_for(retry);
                    log_source_fetch!(retry, source = source, attempt = retry + 1, delay_ms = delay.as_millis() as u64, error = err);
                    sleep(delay).await;
                    retry += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
