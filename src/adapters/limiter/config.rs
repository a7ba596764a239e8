//! Limiter Configuration

use std::time::Duration;

use super::error::LimiterError;

/// Default window of outcomes used for adaptive decisions
pub const DEFAULT_WINDOW_SIZE: usize = 60;

/// Default maximum in-flight requests
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// Floor applied when deriving min_rps from a per-minute budget
pub const MIN_RPS_FLOOR: f64 = 0.2;

/// Rate limiter configuration
#[derive(Debug, Clone, PartialEq)]
pub struct LimiterConfig {
    /// Starting requests per second
    pub initial_rps: f64,
    /// Lower bound for effective_rps
    pub min_rps: f64,
    /// Upper bound for effective_rps
    pub max_rps: f64,
    /// Bucket capacity in seconds of traffic (capacity = max(1, rps * burst_seconds))
    pub burst_seconds: f64,
    /// Maximum requests in flight
    pub max_concurrency: usize,
    /// Number of outcomes evaluated per adjustment
    pub window_size: usize,
    /// Decrease when the 429 fraction is above this
    pub backoff_threshold: f64,
    /// Increase when the 429 fraction is below this
    pub recovery_threshold: f64,
    /// Multiplier applied on backoff (< 1)
    pub decrease_factor: f64,
    /// Multiplier applied on recovery (> 1)
    pub increase_factor: f64,
    /// Upper bound on any Retry-After sleep
    pub retry_after_cap: Duration,
    /// Total attempts for a request answered with 5xx
    pub max_server_error_attempts: u32,
    /// First 5xx backoff delay, doubled per attempt
    pub server_error_backoff: Duration,
    /// Upper bound of random jitter added to each 5xx backoff
    pub server_error_jitter: Duration,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self::from_calls_per_min(28)
    }
}

impl LimiterConfig {
    /// Derive a config from a provider's published per-minute limit.
    ///
    /// The limiter starts at, and never exceeds, the published rate; it may
    /// back off to half of it (never below 0.2 rps).
    pub fn from_calls_per_min(calls_per_min: u32) -> Self {
        let max_rps = (calls_per_min as f64 / 60.0).max(MIN_RPS_FLOOR);
        Self {
            initial_rps: max_rps,
            min_rps: (max_rps * 0.5).max(MIN_RPS_FLOOR),
            max_rps,
            burst_seconds: 1.0,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            window_size: DEFAULT_WINDOW_SIZE,
            backoff_threshold: 0.30,
            recovery_threshold: 0.10,
            decrease_factor: 0.75,
            increase_factor: 1.10,
            retry_after_cap: Duration::from_secs(3),
            max_server_error_attempts: 2,
            server_error_backoff: Duration::from_millis(400),
            server_error_jitter: Duration::from_millis(100),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), LimiterError> {
        let positive = |v: f64| v.is_finite() && v > 0.0;

        if !positive(self.min_rps) || !positive(self.max_rps) {
            return Err(LimiterError::InvalidConfig(
                "min_rps and max_rps must be positive".into(),
            ));
        }
        if self.min_rps > self.max_rps {
            return Err(LimiterError::InvalidConfig(format!(
                "min_rps {} exceeds max_rps {}",
                self.min_rps, self.max_rps
            )));
        }
        if !positive(self.burst_seconds) {
            return Err(LimiterError::InvalidConfig("burst_seconds must be positive".into()));
        }
        if self.max_concurrency == 0 {
            return Err(LimiterError::InvalidConfig("max_concurrency must be at least 1".into()));
        }
        if self.window_size == 0 {
            return Err(LimiterError::InvalidConfig("window_size must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.backoff_threshold)
            || !(0.0..=1.0).contains(&self.recovery_threshold)
        {
            return Err(LimiterError::InvalidConfig("thresholds must be within [0, 1]".into()));
        }
        if self.recovery_threshold > self.backoff_threshold {
            return Err(LimiterError::InvalidConfig(
                "recovery_threshold must not exceed backoff_threshold".into(),
            ));
        }
        if !(self.decrease_factor > 0.0 && self.decrease_factor < 1.0) {
            return Err(LimiterError::InvalidConfig("decrease_factor must be in (0, 1)".into()));
        }
        if !(self.increase_factor > 1.0 && self.increase_factor.is_finite()) {
            return Err(LimiterError::InvalidConfig("increase_factor must be > 1".into()));
        }
        if self.max_server_error_attempts == 0 {
            return Err(LimiterError::InvalidConfig(
                "max_server_error_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Initial rate clamped into bounds
    pub fn clamped_initial_rps(&self) -> f64 {
        self.initial_rps.clamp(self.min_rps, self.max_rps)
    }

    /// Bucket capacity for a given rate
    pub fn capacity_for(&self, rps: f64) -> f64 {
        (rps * self.burst_seconds).max(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_from_calls_per_min() {
        let config = LimiterConfig::from_calls_per_min(30);
        assert_relative_eq!(config.initial_rps, 0.5);
        assert_relative_eq!(config.max_rps, 0.5);
        assert_relative_eq!(config.min_rps, 0.25);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_low_budget_min_floor() {
        let config = LimiterConfig::from_calls_per_min(6);
        assert_relative_eq!(config.min_rps, MIN_RPS_FLOOR);
        assert_relative_eq!(config.max_rps, MIN_RPS_FLOOR);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_capacity_never_below_one() {
        let config = LimiterConfig::default();
        assert_relative_eq!(config.capacity_for(0.2), 1.0);
        assert_relative_eq!(config.capacity_for(4.0), 4.0);
    }

    #[test]
    fn test_invalid_configs() {
        let mut config = LimiterConfig::default();
        config.min_rps = 10.0;
        config.max_rps = 1.0;
        assert!(config.validate().is_err());

        let mut config = LimiterConfig::default();
        config.decrease_factor = 1.5;
        assert!(config.validate().is_err());

        let mut config = LimiterConfig::default();
        config.max_concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = LimiterConfig::default();
        config.recovery_threshold = 0.5;
        config.backoff_threshold = 0.3;
        assert!(config.validate().is_err());
    }
}
