//! Reactive retry for provider rate-limit errors.
//!
//! Proactive pacing keeps the loop under the declared quota, but the provider
//! has the final say. When it still answers with a rate-limit error the unit
//! of work is retried here with exponential backoff. Other errors are returned
//! as-is on the first attempt.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use super::ShutdownSignal;
use crate::agent::AgentError;
use crate::budget::Clock;

pub const DEFAULT_RETRY_ATTEMPTS: u32 = 5;
pub const DEFAULT_RETRY_INITIAL_DELAY: Duration = Duration::from_secs(1);

/// Exponential backoff policy.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_ATTEMPTS,
            initial_delay: DEFAULT_RETRY_INITIAL_DELAY,
            multiplier: 2.0,
        }
    }
}

/// Result of running an operation under a [`RetryPolicy`].
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: Result<T, AgentError>,
    /// Attempts made, including the first
    pub attempts: u32,
}

impl RetryPolicy {
    /// `max_attempts` is clamped to at least one.
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            ..Self::default()
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff before retry number `retry` (0-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.multiplier.powi(retry.min(i32::MAX as u32) as i32);
        Duration::try_from_secs_f64(self.initial_delay.as_secs_f64() * factor).unwrap_or(Duration::MAX)
    }

    /// Run `op` until it succeeds, fails with a non-rate-limit error, or the
    /// attempts are exhausted.
    ///
    /// Shutdown during a backoff sleep ends the retry with
    /// [`AgentError::Interrupted`].
    pub async fn run<T, F, Fut>(
        &self,
        clock: &dyn Clock,
        shutdown: &ShutdownSignal,
        mut op: F,
    ) -> Attempted<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AgentError>>,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let err = match op().await {
                Ok(value) => {
                    return Attempted {
                        result: Ok(value),
                        attempts,
                    }
                }
                Err(err) => err,
            };

            if !err.is_rate_limited() || attempts >= self.max_attempts {
                return Attempted {
                    result: Err(err),
                    attempts,
                };
            }

            let delay = self.delay_for(attempts - 1);
            warn!(
                attempt = attempts + 1,
                max_attempts = self.max_attempts,
                delay_secs = delay.as_secs_f64(),
                "rate limit hit, backing off"
            );

            tokio::select! {
                _ = clock.sleep(delay) => {}
                _ = shutdown.cancelled() => {
                    return Attempted {
                        result: Err(AgentError::Interrupted),
                        attempts,
                    };
                }
            }
        }
    }
}
