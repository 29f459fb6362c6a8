//! Exponential backoff evaluated under a cancellable shutdown signal.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use crate::shutdown::ShutdownSignal;

/// Classifies an error as transient (worth retrying or failing over) or
/// permanent (surface immediately).
pub trait Retryable {
    /// Returns true if a fresh attempt may succeed.
    fn is_retryable(&self) -> bool;
}

/// Backoff schedule: the delay after attempt `n` is
/// `min(initial_delay * multiplier^(n-1), max_delay)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub multiplier: u32,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            multiplier: 2,
            max_delay: Duration::from_secs(60),
            max_attempts: 5,
        }
    }
}

impl BackoffPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_multiplier(mut self, multiplier: u32) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Returns the sleep before the attempt following `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

/// Result of a [`retry`] run.
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    /// An attempt succeeded.
    Succeeded { value: T, attempts: u32 },

    /// Every allowed attempt failed with a retryable error.
    Exhausted { attempts: u32, last_error: E },

    /// An attempt failed with a permanent error; no further attempts were made.
    Rejected { attempts: u32, error: E },

    /// Shutdown was signalled before an attempt could succeed.
    Cancelled { attempts: u32 },
}

impl<T, E> RetryOutcome<T, E> {
    /// Number of attempts that were started.
    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Succeeded { attempts, .. }
            | RetryOutcome::Exhausted { attempts, .. }
            | RetryOutcome::Rejected { attempts, .. }
            | RetryOutcome::Cancelled { attempts } => *attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RetryOutcome::Succeeded { .. })
    }
}

/// Runs `op` until it succeeds, fails permanently, runs out of attempts or
/// `signal` fires. `op` receives the 1-based attempt number.
///
/// Cancellation interrupts both an in-flight attempt and the backoff sleep.
pub async fn retry<T, E, F, Fut>(
    policy: &BackoffPolicy,
    signal: &ShutdownSignal,
    mut op: F,
) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        if signal.is_cancelled() {
            return RetryOutcome::Cancelled { attempts: attempt };
        }
        attempt += 1;

        let result = tokio::select! {
            () = signal.cancelled() => return RetryOutcome::Cancelled { attempts: attempt },
            result = op(attempt) => result,
        };

        match result {
            Ok(value) => {
                return RetryOutcome::Succeeded {
                    value,
                    attempts: attempt,
                };
            }
            Err(error) if !error.is_retryable() => {
                return RetryOutcome::Rejected {
                    attempts: attempt,
                    error,
                };
            }
            Err(error) if attempt >= max_attempts => {
                return RetryOutcome::Exhausted {
                    attempts: attempt,
                    last_error: error,
                };
            }
            Err(error) => {
                let delay = policy.delay_for_attempt(attempt);
                tracing::debug!(attempt, ?delay, error = %error, "attempt failed, backing off");
                tokio::select! {
                    () = signal.cancelled() => return RetryOutcome::Cancelled { attempts: attempt },
                    () = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}
