//! Exponential-backoff reconnection policy for the signal bus.
//!
//! Each scheduled attempt waits `base_delay * 2^retry_count` and bumps
//! the counter. A successful connection resets the counter. Once
//! `max_retries` attempts have been scheduled without success the
//! policy gives up for good.

use std::time::Duration;

pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Tunable parameters for the exponential-backoff strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub base_delay: Duration,
    /// Attempts allowed before giving up.
    pub max_retries: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// Delay before the attempt following `retry_count` earlier ones.
pub fn backoff_delay(base_delay: Duration, retry_count: u32) -> Duration {
    base_delay.saturating_mul(2u32.saturating_pow(retry_count))
}

/// Stateful retry counter driving reconnect scheduling.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    retry_count: u32,
}

impl ReconnectPolicy {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            retry_count: 0,
        }
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn is_exhausted(&self) -> bool {
        self.retry_count >= self.config.max_retries
    }

    /// Forget earlier failures; called after a successful connect.
    pub fn reset(&mut self) {
        self.retry_count = 0;
    }

    /// Schedule the next attempt.
    ///
    /// Returns the delay to wait, or `None` once the retry budget is
    /// spent. The counter is incremented only when a delay is returned.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }
        let delay = backoff_delay(self.config.base_delay, self.retry_count);
        self.retry_count += 1;
        Some(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles() {
        let base = Duration::from_secs(1);
        assert_eq!(backoff_delay(base, 0), Duration::from_secs(1));
        assert_eq!(backoff_delay(base, 1), Duration::from_secs(2));
        assert_eq!(backoff_delay(base, 3), Duration::from_secs(8));
    }

    #[test]
    fn backoff_saturates_instead_of_overflowing() {
        let delay = backoff_delay(Duration::from_secs(1), 200);
        assert_eq!(delay, Duration::from_secs(u64::from(u32::MAX)));
        assert_eq!(backoff_delay(Duration::MAX, 3), Duration::MAX);
    }

    #[test]
    fn full_backoff_sequence() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
        let expected = [1000, 2000, 4000, 8000, 16000];

        for (i, &expected_ms) in expected.iter().enumerate() {
            assert_eq!(policy.retry_count(), i as u32);
            let delay = policy.next_delay().expect("retries left");
            assert_eq!(delay, Duration::from_millis(expected_ms));
        }

        assert!(policy.is_exhausted());
        assert_eq!(policy.next_delay(), None);
        assert_eq!(policy.next_delay(), None);
        assert_eq!(policy.retry_count(), DEFAULT_MAX_RETRIES);
    }

    #[test]
    fn reset_restarts_sequence() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
        policy.next_delay();
        policy.next_delay();

        policy.reset();
        assert_eq!(policy.retry_count(), 0);
        assert_eq!(policy.next_delay(), Some(DEFAULT_BASE_DELAY));
    }

    #[test]
    fn custom_config() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig {
            base_delay: Duration::from_millis(250),
            max_retries: 2,
        });
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(250)));
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(500)));
        assert_eq!(policy.next_delay(), None);
    }

    #[test]
    fn zero_retries_never_schedules() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig {
            max_retries: 0,
            ..Default::default()
        });
        assert!(policy.is_exhausted());
        assert_eq!(policy.next_delay(), None);
    }
}
