//! Pure retry backoff policy for oracle calls.

use std::time::Duration;

/// Longest single wait between attempts.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Delay before retry number `attempt` (0-based): `base * 2^attempt`, capped.
pub fn retry_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    base.checked_mul(factor)
        .unwrap_or(MAX_RETRY_DELAY)
        .min(MAX_RETRY_DELAY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_per_attempt() {
        let base = Duration::from_secs(1);
        assert_eq!(retry_delay(base, 0), Duration::from_secs(1));
        assert_eq!(retry_delay(base, 1), Duration::from_secs(2));
        assert_eq!(retry_delay(base, 2), Duration::from_secs(4));
    }

    #[test]
    fn caps_large_attempts() {
        let base = Duration::from_secs(1);
        assert_eq!(retry_delay(base, 10), MAX_RETRY_DELAY);
        assert_eq!(retry_delay(base, 40), MAX_RETRY_DELAY);
        assert_eq!(retry_delay(Duration::ZERO, 5), Duration::ZERO);
    }
}
