//! Fixed-ceiling retry with linear backoff.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::{KikitoriError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Attempt k waits `base_delay * k` before the next try
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Backoff after the given failed attempt (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }

    /// Run `operation` until it succeeds or the ceiling is reached.
    ///
    /// Every error goes through `reclassify` before it is logged or returned.
    /// On exhaustion the last error is wrapped in `RetriesExhausted`.
    pub async fn execute<F, Fut, T, R>(&self, mut operation: F, reclassify: R) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
        R: Fn(KikitoriError) -> KikitoriError,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    let e = reclassify(e);
                    if attempt >= self.max_attempts {
                        return Err(KikitoriError::RetriesExhausted {
                            attempts: attempt,
                            message: e.to_string(),
                        });
                    }

                    let wait = self.delay_for_attempt(attempt);
                    warn!("Attempt {}/{} failed: {}", attempt, self.max_attempts, e);
                    warn!("Retrying in {} seconds...", wait.as_secs_f64());
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
            }
        }
    }
}
