use crate::store::StoreError;
use serde::Deserialize;
use std::{future::Future, time::Duration};
use tracing::warn;

/// Bounded retry with linear backoff for serialization conflicts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 50,
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms.saturating_mul(u64::from(attempt)))
    }
}

/// Errors that may be worth another attempt.
pub trait Conflict {
    fn is_conflict(&self) -> bool;
}

impl Conflict for StoreError {
    fn is_conflict(&self) -> bool {
        StoreError::is_conflict(self)
    }
}

/// The final error of a retried operation, with how many attempts were made.
#[derive(Debug)]
pub struct Attempts<E> {
    pub attempts: u32,
    pub error: E,
}

/// Runs `op` until it succeeds, fails with a non-conflict error, or runs out of attempts.
pub async fn retry_on_conflict<T, E, Fut>(
    policy: &RetryPolicy,
    what: &'static str,
    mut op: impl FnMut(u32) -> Fut,
) -> Result<T, Attempts<E>>
where
    E: Conflict + std::fmt::Display,
    Fut: Future<Output = Result<T, E>>,
{
    let max = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_conflict() && attempt < max => {
                let delay = policy.delay_after(attempt);
                warn!(what, attempt, delay_ms = delay.as_millis() as u64, %error, "conflict, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => return Err(Attempts { attempts: attempt, error }),
        }
    }
}
