//! Coordinator configuration.

use std::time::Duration;

use crate::error::{Error, Result};

/// Default delay between reconnect attempts.
const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(3);

/// Default poll interval for the temperature characteristic.
const DEFAULT_TEMP_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default poll interval for rarely-changing characteristics.
const DEFAULT_SLOW_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Default timeout for establishing a BLE connection.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default timeout for BLE read/write operations.
const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Default deadline for blocking waits (`connect_wait`, setpoint waits).
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of consecutive failed attempts before the status turns
/// to `Error` (retries keep firing from there).
const DEFAULT_MAX_CONNECT_FAILURES: u32 = 5;

/// Policy deciding when a temperature setpoint counts as reached.
///
/// The device quantizes readings to 0.1 °C and never formally documents the
/// completion condition, so this is a policy choice rather than a constant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TargetPolicy {
    /// Reached once the observed value is at or above the setpoint
    /// (matches a heating ramp; the default).
    AtLeast,
    /// Reached once the observed value is within the given tolerance.
    Within(f32),
    /// Reached only on an exact reading, up to the 0.1 °C quantization.
    Exact,
}

impl TargetPolicy {
    /// Whether `current` satisfies the policy for `target`.
    pub fn reached(&self, current: f32, target: f32) -> bool {
        match self {
            TargetPolicy::AtLeast => current >= target,
            TargetPolicy::Within(tolerance) => (current - target).abs() <= *tolerance,
            TargetPolicy::Exact => (current - target).abs() < 0.05,
        }
    }
}

/// Configuration for a [`crate::Coordinator`].
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use volcano_core::CoordinatorConfig;
///
/// let config = CoordinatorConfig::new("CE:9E:A6:43:25:F3")
///     .reconnect_interval(Duration::from_secs(5))
///     .temp_poll_interval(Duration::from_millis(500));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// BLE address (or platform identifier) of the configured device.
    pub address: String,
    /// Delay between reconnect attempts after a failure or link loss.
    pub reconnect_interval: Duration,
    /// Poll interval for the current-temperature characteristic.
    pub temp_poll_interval: Duration,
    /// Poll interval for rarely-changing characteristics (operating hours,
    /// auto-shutoff, LED brightness, signal strength).
    pub slow_poll_interval: Duration,
    /// Timeout for establishing a connection.
    pub connect_timeout: Duration,
    /// Timeout for a single read operation.
    pub read_timeout: Duration,
    /// Timeout for a single write operation.
    pub write_timeout: Duration,
    /// Default deadline for blocking waits.
    pub command_timeout: Duration,
    /// Consecutive failed attempts before the visible status turns `Error`.
    pub max_connect_failures: u32,
    /// When a temperature setpoint counts as reached.
    pub target_policy: TargetPolicy,
}

impl CoordinatorConfig {
    /// Create a config for the given device address with default intervals.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            temp_poll_interval: DEFAULT_TEMP_POLL_INTERVAL,
            slow_poll_interval: DEFAULT_SLOW_POLL_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_OPERATION_TIMEOUT,
            write_timeout: DEFAULT_OPERATION_TIMEOUT,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            max_connect_failures: DEFAULT_MAX_CONNECT_FAILURES,
            target_policy: TargetPolicy::AtLeast,
        }
    }

    /// Set the reconnect interval.
    #[must_use]
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Set the temperature poll interval.
    #[must_use]
    pub fn temp_poll_interval(mut self, interval: Duration) -> Self {
        self.temp_poll_interval = interval;
        self
    }

    /// Set the slow poll interval.
    #[must_use]
    pub fn slow_poll_interval(mut self, interval: Duration) -> Self {
        self.slow_poll_interval = interval;
        self
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the read timeout.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the write timeout.
    #[must_use]
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the default deadline for blocking waits.
    #[must_use]
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Set the consecutive-failure threshold for the `Error` status.
    #[must_use]
    pub fn max_connect_failures(mut self, failures: u32) -> Self {
        self.max_connect_failures = failures;
        self
    }

    /// Set the setpoint-reached policy.
    #[must_use]
    pub fn target_policy(mut self, policy: TargetPolicy) -> Self {
        self.target_policy = policy;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for an empty address, zero
    /// intervals, or a zero failure threshold.
    pub fn validate(&self) -> Result<()> {
        if self.address.is_empty() {
            return Err(Error::InvalidConfig("address must not be empty".to_string()));
        }
        if self.reconnect_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "reconnect_interval must be > 0".to_string(),
            ));
        }
        if self.temp_poll_interval.is_zero() || self.slow_poll_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "poll intervals must be > 0".to_string(),
            ));
        }
        if self.max_connect_failures == 0 {
            return Err(Error::InvalidConfig(
                "max_connect_failures must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CoordinatorConfig::new("AA:BB:CC:DD:EE:FF");
        assert_eq!(config.reconnect_interval, Duration::from_secs(3));
        assert_eq!(config.temp_poll_interval, Duration::from_secs(1));
        assert_eq!(config.max_connect_failures, 5);
        assert_eq!(config.target_policy, TargetPolicy::AtLeast);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_intervals() {
        let config = CoordinatorConfig::new("AA:BB:CC:DD:EE:FF")
            .reconnect_interval(Duration::ZERO);
        assert!(config.validate().is_err());

        let config =
            CoordinatorConfig::new("AA:BB:CC:DD:EE:FF").temp_poll_interval(Duration::ZERO);
        assert!(config.validate().is_err());

        let config = CoordinatorConfig::new("");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_target_policy_at_least() {
        let policy = TargetPolicy::AtLeast;
        assert!(policy.reached(180.0, 180.0));
        assert!(policy.reached(180.1, 180.0));
        assert!(!policy.reached(179.9, 180.0));
    }

    #[test]
    fn test_target_policy_within() {
        let policy = TargetPolicy::Within(0.5);
        assert!(policy.reached(179.6, 180.0));
        assert!(policy.reached(180.4, 180.0));
        assert!(!policy.reached(179.0, 180.0));
    }

    #[test]
    fn test_target_policy_exact() {
        let policy = TargetPolicy::Exact;
        assert!(policy.reached(180.0, 180.0));
        assert!(!policy.reached(180.1, 180.0));
    }
}
