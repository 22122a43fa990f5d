use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RemoteError;

/// Bounded retry schedule for remote uploads.
///
/// The operation is attempted up to `max_attempts` times; before attempt
/// `n + 1` the caller sleeps `base_backoff_ms * 2^(n - 1)` (2s, then 4s with
/// the defaults).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no sleeping.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            base_backoff_ms: 0,
        }
    }

    /// Delay after failed attempt `attempt` (1-based).
    pub fn delay_after(&self, attempt: usize) -> Duration {
        let exp = u32::try_from(attempt.saturating_sub(1)).unwrap_or(u32::MAX).min(16);
        Duration::from_millis(self.base_backoff_ms.saturating_mul(1u64 << exp))
    }

    /// The full sleep schedule between attempts.
    pub fn delays(&self) -> Vec<Duration> {
        (1..self.max_attempts.max(1)).map(|a| self.delay_after(a)).collect()
    }
}

/// All attempts failed; carries the error from the final attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("gave up after {attempts} attempt(s): {last_error}")]
pub struct RetryExhausted {
    pub attempts: usize,
    pub last_error: RemoteError,
}

/// Run `op` under `policy`, sleeping on the tokio clock between attempts.
///
/// `op` receives the 1-based attempt number. Lock contention is logged apart
/// from other failures but both are retried the same way.
pub async fn retry_remote<T, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T, RetryExhausted>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        tracing::debug!(attempt, max_attempts, "{what}: attempt");
        let err = match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        match &err {
            RemoteError::Locked(reason) => {
                tracing::warn!(attempt, max_attempts, %reason, "{what}: remote document is locked by another writer");
            }
            RemoteError::Unavailable(reason) => {
                tracing::warn!(attempt, max_attempts, %reason, "{what}: attempt failed");
            }
        }
        if attempt >= max_attempts {
            return Err(RetryExhausted {
                attempts: attempt,
                last_error: err,
            });
        }
        let delay = policy.delay_after(attempt);
        tracing::info!(delay_ms = delay.as_millis() as u64, "{what}: retrying");
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
