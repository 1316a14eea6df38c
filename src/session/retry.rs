// Retry policies — stateless attempt-to-delay mappings with a hard ceiling.

use std::time::Duration;

use crate::config::{
    BEACON_RETRY_BASE_MS, BEACON_RETRY_LIMIT, FETCH_RETRY_BASE_MS, FETCH_RETRY_LIMIT,
};

/// Linear backoff: attempt `n` waits `base_delay * n`, attempts past
/// `max_attempts` are not retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// Policy for metadata fetch failures.
    pub fn metadata() -> Self {
        Self {
            base_delay: Duration::from_millis(FETCH_RETRY_BASE_MS),
            max_attempts: FETCH_RETRY_LIMIT,
        }
    }

    /// Policy for the fire-and-forget preview beacon.
    pub fn beacon() -> Self {
        Self {
            base_delay: Duration::from_millis(BEACON_RETRY_BASE_MS),
            max_attempts: BEACON_RETRY_LIMIT,
        }
    }

    /// Delay before the given attempt (1-based), or `None` once exhausted.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        Some(self.base_delay * attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::metadata()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_delays_are_linear() {
        let policy = RetryPolicy::metadata();
        for attempt in 1..=5 {
            assert_eq!(
                policy.delay_for(attempt),
                Some(Duration::from_millis(500 * attempt as u64))
            );
        }
        assert_eq!(policy.delay_for(6), None);
        assert_eq!(policy.delay_for(0), None);
    }

    #[test]
    fn test_beacon_caps_at_three() {
        let policy = RetryPolicy::beacon();
        assert_eq!(policy.delay_for(3), Some(Duration::from_millis(1500)));
        assert_eq!(policy.delay_for(4), None);
    }
}
