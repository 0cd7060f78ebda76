//! Bounded retry with backoff for capability calls.
//!
//! Stateless: all logic lives in associated functions on `RetryHandler` that
//! take the policy as a parameter. Only transient failures are retried; a
//! permanent failure stops immediately. Backoff waits are raced against the
//! run's cancellation token so a cancelled run never sits out a delay.

use std::future::Future;

use playbook_types::config::RetryPolicy;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::capability::CapabilityError;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A successful value together with the attempt count that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Retried<T> {
    pub value: T,
    /// 1-based; 1 means the first attempt succeeded.
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RetryError {
    /// Every allowed attempt failed transiently.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: CapabilityError },

    /// A non-retryable failure on the given attempt.
    #[error("{error}")]
    Permanent { attempt: u32, error: CapabilityError },

    /// Cancellation was observed before the next attempt.
    #[error("cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },
}

impl RetryError {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } | RetryError::Cancelled { attempts } => {
                *attempts
            }
            RetryError::Permanent { attempt, .. } => *attempt,
        }
    }
}

// ---------------------------------------------------------------------------
// RetryHandler
// ---------------------------------------------------------------------------

pub struct RetryHandler;

impl RetryHandler {
    /// Whether another attempt should follow the failed `attempt` (1-based).
    ///
    /// A policy with `max_attempts == 0` still allows the single first attempt.
    pub fn should_retry(policy: &RetryPolicy, attempt: u32, error: &CapabilityError) -> bool {
        error.is_transient() && attempt < policy.max_attempts.max(1)
    }

    /// Run `op` until it succeeds, fails permanently, exhausts the policy,
    /// or the token is cancelled.
    ///
    /// `op` receives the 1-based attempt number.
    pub async fn with_retry<T, F, Fut>(
        policy: &RetryPolicy,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<Retried<T>, RetryError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, CapabilityError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled { attempts: attempt });
            }
            attempt += 1;

            let error = match op(attempt).await {
                Ok(value) => {
                    return Ok(Retried {
                        value,
                        attempts: attempt,
                    });
                }
                Err(error) => error,
            };

            if !error.is_transient() {
                return Err(RetryError::Permanent { attempt, error });
            }
            if !Self::should_retry(policy, attempt, &error) {
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: error,
                });
            }

            let delay = policy.delay_after(attempt);
            tracing::warn!(
                attempt,
                max_attempts = policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "transient failure, retrying"
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(RetryError::Cancelled { attempts: attempt });
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
