//! Retry policy with exponential backoff and jitter.
//!
//! Retries are an explicit loop around the attempt closure. The only suspension point added by
//! the policy is the backoff wait, which goes through [`CallContext::sleep`] and therefore
//! returns as soon as the caller cancels or the deadline passes.

use crate::context::CallContext;
use crate::Error;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for retry logic
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    /// Add up to 25% random jitter on top of the computed backoff.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.base_backoff = base;
        self.max_backoff = max;
        self
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }
}

/// Successful result plus the number of attempts it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: u32,
}

/// Last error of a failed execution, annotated with the attempts made.
#[derive(Debug)]
pub struct RetryFailure {
    pub error: Error,
    pub attempts: u32,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Backoff before the attempt following failed attempt `attempt` (1-based), without jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let base = self.config.base_backoff.as_millis() as u64;
        let cap = self.config.max_backoff.as_millis() as u64;
        let factor = 1u64
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u64::MAX);
        Duration::from_millis(base.saturating_mul(factor).min(cap))
    }

    /// Backoff including jitter drawn uniformly from `[0, delay / 4]`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let delay = self.base_delay(attempt);
        if !self.config.jitter {
            return delay;
        }
        let spread = delay.as_millis() as u64 / 4;
        if spread == 0 {
            return delay;
        }
        let jitter = rand::rng().random_range(0..=spread);
        delay + Duration::from_millis(jitter)
    }

    /// Run `op` until it succeeds, fails fatally, or the attempt budget is spent.
    ///
    /// `op` receives the 1-based attempt number. `on_retry` is called with the number of the
    /// upcoming attempt right before each backoff wait.
    pub async fn execute<T, F, Fut, R>(
        &self,
        ctx: &CallContext,
        mut on_retry: R,
        mut op: F,
    ) -> std::result::Result<Attempted<T>, RetryFailure>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = crate::Result<T>>,
        R: FnMut(u32),
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt: u32 = 1;

        loop {
            if let Err(error) = ctx.check() {
                return Err(RetryFailure {
                    error,
                    attempts: attempt - 1,
                });
            }

            match op(attempt).await {
                Ok(value) => {
                    return Ok(Attempted {
                        value,
                        attempts: attempt,
                    })
                }
                Err(error) if error.is_retryable() && attempt < max_attempts => {
                    let delay = self.delay(attempt);
                    warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error_kind = error.kind().name(),
                        "attempt failed with retryable error, backing off"
                    );
                    on_retry(attempt + 1);
                    if let Err(wait_err) = ctx.sleep(delay).await {
                        return Err(RetryFailure {
                            error: wait_err,
                            attempts: attempt,
                        });
                    }
                    attempt += 1;
                }
                Err(error) => {
                    debug!(
                        attempt,
                        error_kind = error.kind().name(),
                        "giving up"
                    );
                    return Err(RetryFailure {
                        error,
                        attempts: attempt,
                    });
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}
