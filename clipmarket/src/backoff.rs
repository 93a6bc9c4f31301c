//! Exponential backoff shared by reconnect scheduling and request retry.

use std::time::Duration;

/// Delay before retry `attempt` (zero-based): `base * 2^attempt`.
///
/// Saturates at [`Duration::MAX`].
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    2u32.checked_pow(attempt)
        .and_then(|factor| base.checked_mul(factor))
        .unwrap_or(Duration::MAX)
}
