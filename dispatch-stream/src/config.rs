//! Configuration types for the dispatch-stream crate
//!
//! [`ListenerConfig`] controls reconnection backoff, retry limits, replay
//! settling and forced rotation of a pooled listener's stream.

use std::time::Duration;

use crate::error::{ListenerError, Result};

/// Configuration for a pooled listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerConfig {
    /// Delay before the first reconnection attempt
    /// Default: 100 milliseconds
    pub retry_base_delay: Duration,

    /// Upper bound for the reconnection delay
    /// Default: 5 seconds
    pub max_retry_delay: Duration,

    /// Consecutive failed connections tolerated before giving up for good.
    /// `None` retries for as long as there are waiters.
    /// Default: None (run listener), Some(5) (durable listener)
    pub max_retries: Option<u32>,

    /// Pause after a reconnect before active subscriptions are replayed
    /// Default: 100 milliseconds
    pub replay_settle_delay: Duration,

    /// Maximum lifetime of a single stream before it is rebuilt
    /// Default: None (run listener), Some(15 minutes) (durable listener)
    pub rotation_interval: Option<Duration>,

    /// How long `shutdown()` waits for the connection task
    /// Default: 5 seconds
    pub shutdown_timeout: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            retry_base_delay: Duration::from_millis(100),
            max_retry_delay: Duration::from_millis(5000),
            max_retries: None,
            replay_settle_delay: Duration::from_millis(100),
            rotation_interval: None,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl ListenerConfig {
    /// Create a new ListenerConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults for the workflow-run listener
    pub fn run_listener() -> Self {
        Self::default()
    }

    /// Defaults for the durable-event listener
    pub fn durable_listener() -> Self {
        Self {
            max_retries: Some(5),
            rotation_interval: Some(Duration::from_secs(15 * 60)),
            ..Default::default()
        }
    }

    /// Delay before reconnection attempt `attempt` (1-based).
    ///
    /// `min(retry_base_delay * 2^(attempt - 1), max_retry_delay)`
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.retry_base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_retry_delay)
            .min(self.max_retry_delay)
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<()> {
        if self.retry_base_delay.is_zero() {
            return Err(ListenerError::Configuration(
                "Retry base delay must be greater than 0".to_string(),
            ));
        }

        if self.retry_base_delay > self.max_retry_delay {
            return Err(ListenerError::Configuration(
                "Invalid retry delay: base must not exceed max".to_string(),
            ));
        }

        if self.max_retries == Some(0) {
            return Err(ListenerError::Configuration(
                "Max retries must be greater than 0".to_string(),
            ));
        }

        if self.rotation_interval.is_some_and(|interval| interval.is_zero()) {
            return Err(ListenerError::Configuration(
                "Rotation interval must be greater than 0".to_string(),
            ));
        }

        if self.shutdown_timeout.is_zero() {
            return Err(ListenerError::Configuration(
                "Shutdown timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn with_retry_delays(mut self, base: Duration, max: Duration) -> Self {
        self.retry_base_delay = base;
        self.max_retry_delay = max;
        self
    }

    pub fn with_max_retries(mut self, max_retries: Option<u32>) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_replay_settle_delay(mut self, delay: Duration) -> Self {
        self.replay_settle_delay = delay;
        self
    }

    pub fn with_rotation_interval(mut self, interval: Option<Duration>) -> Self {
        self.rotation_interval = interval;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[test]
    fn test_default_config() {
        let config = ListenerConfig::default();
        assert_eq!(config.retry_base_delay, Duration::from_millis(100));
        assert_eq!(config.max_retry_delay, Duration::from_secs(5));
        assert_eq!(config.max_retries, None);
        assert_eq!(config.rotation_interval, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_durable_preset() {
        let config = ListenerConfig::durable_listener();
        assert_eq!(config.max_retries, Some(5));
        assert_eq!(config.rotation_interval, Some(Duration::from_secs(900)));
        assert!(config.validate().is_ok());
    }

    #[rstest]
    #[case(1, 100)]
    #[case(2, 200)]
    #[case(3, 400)]
    #[case(4, 800)]
    #[case(5, 1600)]
    #[case(6, 3200)]
    #[case(7, 5000)]
    #[case(40, 5000)]
    fn test_backoff_schedule(#[case] attempt: u32, #[case] millis: u64) {
        let config = ListenerConfig::default();
        assert_eq!(config.backoff_delay(attempt), Duration::from_millis(millis));
    }

    proptest! {
        #[test]
        fn backoff_is_monotonic_and_capped(attempt in 1u32..10_000) {
            let config = ListenerConfig::default();
            let current = config.backoff_delay(attempt);
            let next = config.backoff_delay(attempt + 1);
            prop_assert!(current <= next);
            prop_assert!(next <= config.max_retry_delay);
        }
    }

    #[test]
    fn test_config_validation() {
        let invalid = ListenerConfig::new()
            .with_retry_delays(Duration::from_secs(10), Duration::from_secs(1));
        assert!(invalid.validate().is_err());

        let invalid = ListenerConfig::new().with_max_retries(Some(0));
        assert!(invalid.validate().is_err());

        let invalid = ListenerConfig::new().with_rotation_interval(Some(Duration::ZERO));
        assert!(invalid.validate().is_err());

        let invalid = ListenerConfig::new().with_shutdown_timeout(Duration::ZERO);
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_builder_pattern() {
        let config = ListenerConfig::new()
            .with_retry_delays(Duration::from_millis(50), Duration::from_secs(2))
            .with_max_retries(Some(3))
            .with_replay_settle_delay(Duration::from_millis(10))
            .with_rotation_interval(Some(Duration::from_secs(60)));

        assert_eq!(config.backoff_delay(1), Duration::from_millis(50));
        assert_eq!(config.max_retries, Some(3));
        assert_eq!(config.replay_settle_delay, Duration::from_millis(10));
        assert!(config.validate().is_ok());
    }
}
