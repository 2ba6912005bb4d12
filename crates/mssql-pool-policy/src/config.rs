//! Policy configuration.

use std::time::Duration;

use crate::error::PoolError;

/// Configuration for the pool policy.
///
/// `acquire_timeout`, `acquire_queue_capacity` and `throw_on_acquire_timeout`
/// are consumed by the external pool primitive the policy is plugged into;
/// the remaining fields drive the policy itself.
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    /// Pool name, used in the unavailable error and tracing fields.
    pub pool_name: String,

    /// How long a synchronous acquire may block before failing.
    pub acquire_timeout: Duration,

    /// Bound on queued asynchronous acquire requests.
    pub acquire_queue_capacity: usize,

    /// Whether an exhausted acquire fails with an error rather than
    /// returning nothing.
    pub throw_on_acquire_timeout: bool,

    /// Interval between recovery probes while the pool is unavailable.
    pub recovery_interval: Duration,

    /// Per-call timeout for the liveness probe.
    pub probe_timeout: Duration,

    /// Idle time after which an acquired connection is re-probed before
    /// being handed out.
    pub idle_revalidation: Duration,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            pool_name: "mssql-pool".to_string(),
            acquire_timeout: Duration::from_secs(15),
            acquire_queue_capacity: 1024,
            throw_on_acquire_timeout: true,
            recovery_interval: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(1),
            idle_revalidation: Duration::from_secs(60),
        }
    }
}

impl PolicyConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pool name.
    #[must_use]
    pub fn pool_name(mut self, name: impl Into<String>) -> Self {
        self.pool_name = name.into();
        self
    }

    /// Set the synchronous acquire timeout.
    #[must_use]
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Set the asynchronous acquire queue capacity.
    #[must_use]
    pub fn acquire_queue_capacity(mut self, capacity: usize) -> Self {
        self.acquire_queue_capacity = capacity;
        self
    }

    /// Set whether acquire exhaustion raises an error.
    #[must_use]
    pub fn throw_on_acquire_timeout(mut self, throw: bool) -> Self {
        self.throw_on_acquire_timeout = throw;
        self
    }

    /// Set the recovery probe interval.
    #[must_use]
    pub fn recovery_interval(mut self, interval: Duration) -> Self {
        self.recovery_interval = interval;
        self
    }

    /// Set the liveness probe timeout.
    #[must_use]
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Set the idle revalidation threshold.
    #[must_use]
    pub fn idle_revalidation(mut self, threshold: Duration) -> Self {
        self.idle_revalidation = threshold;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.pool_name.is_empty() {
            return Err(PoolError::Config("pool name cannot be empty".into()));
        }
        if self.acquire_timeout.is_zero() {
            return Err(PoolError::Config("acquire timeout must be non-zero".into()));
        }
        if self.acquire_queue_capacity == 0 {
            return Err(PoolError::Config(
                "acquire queue capacity must be non-zero".into(),
            ));
        }
        if self.recovery_interval.is_zero() {
            return Err(PoolError::Config(
                "recovery interval must be non-zero".into(),
            ));
        }
        if self.probe_timeout.is_zero() {
            return Err(PoolError::Config("probe timeout must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(PolicyConfig::default().validate().is_ok());
    }

    #[test]
    fn test_builder_fluent() {
        let config = PolicyConfig::new()
            .pool_name("orders")
            .recovery_interval(Duration::from_secs(2))
            .probe_timeout(Duration::from_millis(500))
            .acquire_queue_capacity(64)
            .throw_on_acquire_timeout(false);

        assert_eq!(config.pool_name, "orders");
        assert_eq!(config.recovery_interval, Duration::from_secs(2));
        assert_eq!(config.probe_timeout, Duration::from_millis(500));
        assert_eq!(config.acquire_queue_capacity, 64);
        assert!(!config.throw_on_acquire_timeout);
    }

    #[test]
    fn test_validate_rejects_zero_durations() {
        let config = PolicyConfig::new().recovery_interval(Duration::ZERO);
        assert!(matches!(config.validate(), Err(PoolError::Config(_))));

        let config = PolicyConfig::new().probe_timeout(Duration::ZERO);
        assert!(matches!(config.validate(), Err(PoolError::Config(_))));

        let config = PolicyConfig::new().acquire_timeout(Duration::ZERO);
        assert!(matches!(config.validate(), Err(PoolError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_empty_name_and_queue() {
        let config = PolicyConfig::new().pool_name("");
        assert!(matches!(config.validate(), Err(PoolError::Config(_))));

        let config = PolicyConfig::new().acquire_queue_capacity(0);
        assert!(matches!(config.validate(), Err(PoolError::Config(_))));
    }
}
