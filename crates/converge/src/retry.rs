//! Retry logic with exponential backoff for transient errors.

use crate::error::StepError;
use std::thread;
use std::time::Duration;

/// Configuration for retry logic.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub base_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_factor: f64,
    /// Maximum delay between attempts
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            backoff_factor,
            ..Self::default()
        }
    }

    /// Retry up to `max_attempts` times without sleeping
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, 1.0)
    }

    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay after a failed attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        let capped = delay.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }
}

/// Result of [`with_retry`] along with the number of attempts made
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T, StepError>,
    pub attempts: u32,
}

/// Execute an operation with retry logic.
///
/// Retries only [`StepError::Transient`] failures, sleeping with exponential
/// backoff between attempts. `on_retry` is called before each sleep with the
/// 1-indexed attempt that failed. `cancelled` is checked before every retry;
/// once it returns true the last error is returned without further attempts.
pub fn with_retry<T, F, C, X>(
    policy: &RetryPolicy,
    mut on_retry: C,
    cancelled: X,
    mut operation: F,
) -> RetryOutcome<T>
where
    F: FnMut() -> Result<T, StepError>,
    C: FnMut(u32, &StepError, Duration),
    X: Fn() -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let err = match operation() {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt,
                };
            }
            Err(e) => e,
        };

        if !err.is_retryable() || attempt >= max_attempts || cancelled() {
            return RetryOutcome {
                result: Err(err),
                attempts: attempt,
            };
        }

        let delay = policy.delay_for_attempt(attempt - 1);
        on_retry(attempt, &err, delay);
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }
}
