//! Bounded retry with exponential backoff.
//!
//! # Policy
//!
//! - Attempt 1 runs immediately; a success returns without any delay.
//! - A failure is classified against [`RetryPolicy::retryable_errors`]:
//!   literal substrings or regex patterns over the error's `Display` text.
//!   No list means every error is retryable.
//! - Non-retryable errors surface untouched as [`RetryError::NonRetryable`].
//! - Retryable errors sleep `initial_delay * backoff_factor^n` (clamped at
//!   `max_delay`) and try again, up to `max_attempts` total.
//! - The final failure is wrapped in [`RetryError::Exhausted`]; no sleep
//!   follows the last attempt.

use std::fmt::Display;
use std::future::Future;

use relay_types::RetryPolicy;
use thiserror::Error;
use tokio::time::sleep;

/// Failure of a retried operation.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error.
    #[error("Operation failed after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: E },
    /// The first non-retryable error, exactly as the operation returned it.
    #[error("{0}")]
    NonRetryable(E),
}

impl<E> RetryError<E> {
    /// The underlying error of the last attempt.
    pub fn into_inner(self) -> E {
        match self {
            Self::Exhausted { last_error, .. } => last_error,
            Self::NonRetryable(error) => error,
        }
    }

    #[must_use]
    pub fn last_error(&self) -> &E {
        match self {
            Self::Exhausted { last_error, .. } => last_error,
            Self::NonRetryable(error) => error,
        }
    }

    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}

/// Runs fallible async operations under a [`RetryPolicy`].
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until it succeeds, fails non-retryably, or runs out of attempts.
    ///
    /// `label` identifies the operation in retry logs.
    pub async fn execute<T, E, F, Fut>(
        &self,
        mut operation: F,
        label: &str,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut delay = self.policy.initial_delay;
        let mut attempt = 1;

        loop {
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            let message = error.to_string();
            if !self.policy.is_retryable(&message) {
                tracing::debug!(label, attempt, error = %message, "Non-retryable failure");
                return Err(RetryError::NonRetryable(error));
            }

            if attempt >= max_attempts {
                return Err(RetryError::Exhausted {
                    attempts: max_attempts,
                    last_error: error,
                });
            }

            tracing::warn!(
                label,
                attempt,
                max_attempts,
                error = %message,
                delay_ms = delay.as_millis() as u64,
                "Retrying operation"
            );
            sleep(delay).await;
            delay = self.policy.next_delay(delay);
            attempt += 1;
        }
    }
}
