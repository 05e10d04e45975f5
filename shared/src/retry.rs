//! Generic retry combinator with exponential backoff.
//!
//! The combinator knows nothing about HTTP: the operation decides what counts
//! as a failure by returning `Err`, the [`RetryPolicy`] decides how often and
//! how long to wait.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::warn;

/// Maps the zero-based index of a failed attempt to the wait before the next.
pub type BackoffFn = fn(u32) -> Duration;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: BackoffFn,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

    pub fn new(max_attempts: u32, backoff: BackoffFn) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Same attempt budget, no waiting. Used by tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, |_| Duration::ZERO)
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        (self.backoff)(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ATTEMPTS, backoff_with_jitter)
    }
}

/// `2^attempt` seconds plus up to one second of random jitter.
pub fn backoff_with_jitter(attempt: u32) -> Duration {
    let base = 1000u64 * 2u64.pow(attempt.min(16));
    let jitter: u64 = rand::thread_rng().gen_range(0..1000);
    Duration::from_millis(base + jitter)
}

/// Returned once every attempt of a [`retry`] run has failed.
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub last: E,
}

/// Runs `op` until it succeeds or the policy's attempt budget is spent.
///
/// `op` receives the zero-based attempt index. A policy with
/// `max_attempts == 0` still runs the operation once.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, RetryExhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let used = attempt + 1;
                if used >= max_attempts {
                    return Err(RetryExhausted {
                        attempts: used,
                        last: err,
                    });
                }
                let delay = policy.delay_for(attempt);
                warn!(
                    attempt = used,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "attempt failed, retrying: {err}"
                );
                sleep(delay).await;
                attempt = used;
            }
        }
    }
}
