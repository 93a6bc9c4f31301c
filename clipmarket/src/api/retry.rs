//! Retry combinator for envelope-returning operations.

use super::envelope::ApiResponse;
use crate::backoff::backoff_delay;
use std::{future::Future, time::Duration};

/// How many times to invoke an operation and how long to wait in between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total invocations, including the first. Zero is treated as one.
    pub max_attempts: u32,
    /// Wait after the first failure; doubles after each further failure
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }
}

/// Invoke `operation` until it succeeds or the policy is exhausted.
///
/// After failed attempt `n` (zero-based) waits `base_delay * 2^n`. Returns
/// the first successful response, or the last failed one; never waits after
/// the final attempt.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, mut operation: F) -> ApiResponse<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ApiResponse<T>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        let response = operation().await;
        if response.success {
            return response;
        }

        attempt += 1;
        if attempt >= attempts {
            log::warn!(
                "Giving up after {} attempts: {}",
                attempts,
                response.message.as_deref().unwrap_or("unknown error")
            );
            return response;
        }

        let delay = backoff_delay(policy.base_delay, attempt - 1);
        log::debug!("Attempt {}/{} failed, retrying in {:?}", attempt, attempts, delay);
        tokio::time::sleep(delay).await;
    }
}
