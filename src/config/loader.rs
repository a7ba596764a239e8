//! Configuration Loader
//!
//! Loads and validates configuration from TOML files matching wakewatch.toml.
//! Every section has defaults, so a partial file is enough.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::adapters::limiter::LimiterConfig;
use crate::application::{CoreSettings, CycleSettings};
use crate::domain::{RatioMode, RevivalRule};

/// Environment variable overriding `[storage] db_path`
pub const DB_PATH_ENV: &str = "WAKEWATCH_DB_PATH";

/// Main configuration structure matching wakewatch.toml
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub limiter: LimiterSection,
    #[serde(default)]
    pub budget: BudgetSection,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub alerts: AlertsSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub cycle: CycleSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Rate limiter section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimiterSection {
    /// Provider's published budget
    pub calls_per_min: u32,
    /// Override the derived lower bound (default: half the base rate, >= 0.2)
    pub min_rps: Option<f64>,
    /// Override the derived upper bound (default: calls_per_min / 60)
    pub max_rps: Option<f64>,
    pub burst_seconds: f64,
    pub max_concurrency: usize,
    /// Outcomes per adaptive evaluation
    pub window_size: usize,
    pub backoff_threshold: f64,
    pub recovery_threshold: f64,
    pub decrease_factor: f64,
    pub increase_factor: f64,
    /// Longest Retry-After sleep honoured
    pub retry_after_cap_secs: f64,
    /// Total attempts for a 5xx answer
    pub server_error_attempts: u32,
    pub server_error_backoff_ms: u64,
    pub server_error_jitter_ms: u64,
}

impl Default for LimiterSection {
    fn default() -> Self {
        let derived = LimiterConfig::from_calls_per_min(28);
        Self {
            calls_per_min: 28,
            min_rps: None,
            max_rps: None,
            burst_seconds: derived.burst_seconds,
            max_concurrency: derived.max_concurrency,
            window_size: derived.window_size,
            backoff_threshold: derived.backoff_threshold,
            recovery_threshold: derived.recovery_threshold,
            decrease_factor: derived.decrease_factor,
            increase_factor: derived.increase_factor,
            retry_after_cap_secs: derived.retry_after_cap.as_secs_f64(),
            server_error_attempts: derived.max_server_error_attempts,
            server_error_backoff_ms: derived.server_error_backoff.as_millis() as u64,
            server_error_jitter_ms: derived.server_error_jitter.as_millis() as u64,
        }
    }
}

/// Per-cycle budget section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BudgetSection {
    /// Calls kept in hand for retries and surprises
    pub safety_reserve: u32,
    /// Whether the secondary data source is in use
    pub fallback_enabled: bool,
    /// Calls reserved for the secondary source when enabled
    pub fallback_reserve: u32,
    pub min_probes: u32,
    pub max_probes: u32,
}

impl Default for BudgetSection {
    fn default() -> Self {
        Self {
            safety_reserve: 4,
            fallback_enabled: false,
            fallback_reserve: 3,
            min_probes: 3,
            max_probes: 30,
        }
    }
}

impl BudgetSection {
    /// Fallback reserve actually deducted
    pub fn effective_fallback_reserve(&self) -> u32 {
        if self.fallback_enabled {
            self.fallback_reserve
        } else {
            0
        }
    }
}

/// Cache section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    /// TTL of cached probe metrics
    pub probe_ttl_secs: u64,
    /// How long a probed key is skipped
    pub seen_ttl_min: u64,
    pub max_entries: usize,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            probe_ttl_secs: 300,
            seen_ttl_min: 10,
            max_entries: 10_000,
        }
    }
}

/// Alert rule and cooldown section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertsSection {
    /// Minimum time between two alerts for the same key
    pub cooldown_min: u64,
    /// Entities younger than this never alert
    pub min_age_days: f64,
    /// Optional floor on the prior-window metric
    pub prior_floor: Option<f64>,
    pub ratio_min: f64,
    /// "direct" or "exclude_recent"
    pub ratio_mode: RatioMode,
    /// Label of the recent window, e.g. "1h"
    pub recent_window: String,
    /// Label of the comparison window, e.g. "prev 24h"
    pub prior_window: String,
}

impl Default for AlertsSection {
    fn default() -> Self {
        Self {
            cooldown_min: 30,
            min_age_days: 7.0,
            prior_floor: None,
            ratio_min: 2.0,
            ratio_mode: RatioMode::Direct,
            recent_window: "1h".to_string(),
            prior_window: "prev 24h".to_string(),
        }
    }
}

impl AlertsSection {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_min.saturating_mul(60))
    }
}

/// Storage section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// SQLite file holding the cooldown ledger
    pub db_path: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            db_path: "~/.wakewatch/state.db".to_string(),
        }
    }
}

impl StorageSection {
    /// Get the database path with environment variable override.
    /// Checks WAKEWATCH_DB_PATH first, then expands `~` and `$VARS`.
    pub fn get_db_path(&self) -> PathBuf {
        let raw = std::env::var(DB_PATH_ENV).unwrap_or_else(|_| self.db_path.clone());
        let expanded = shellexpand::full(&raw)
            .map(|s| s.into_owned())
            .unwrap_or(raw);
        PathBuf::from(expanded)
    }
}

/// Loop scheduling section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CycleSection {
    pub loop_seconds: u64,
    /// Stop starting probes after this many seconds (default: loop_seconds)
    pub soft_deadline_secs: Option<u64>,
    pub probe_workers: usize,
}

impl Default for CycleSection {
    fn default() -> Self {
        Self {
            loop_seconds: 60,
            soft_deadline_secs: None,
            probe_workers: 8,
        }
    }
}

/// Logging configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limiter.calls_per_min == 0 {
            return Err(ConfigError::ValidationError(
                "calls_per_min must be > 0".to_string(),
            ));
        }

        LimiterConfig::from(self)
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        if self.budget.min_probes > self.budget.max_probes {
            return Err(ConfigError::ValidationError(format!(
                "min_probes ({}) must not exceed max_probes ({})",
                self.budget.min_probes, self.budget.max_probes
            )));
        }

        if self.cache.probe_ttl_secs == 0 || self.cache.seen_ttl_min == 0 {
            return Err(ConfigError::ValidationError(
                "cache TTLs must be > 0".to_string(),
            ));
        }

        if self.cache.max_entries == 0 {
            return Err(ConfigError::ValidationError(
                "max_entries must be > 0".to_string(),
            ));
        }

        if self.alerts.cooldown_min == 0 {
            return Err(ConfigError::ValidationError(
                "cooldown_min must be > 0".to_string(),
            ));
        }

        if !(self.alerts.ratio_min.is_finite() && self.alerts.ratio_min > 0.0) {
            return Err(ConfigError::ValidationError(format!(
                "ratio_min must be > 0, got {}",
                self.alerts.ratio_min
            )));
        }

        if !(self.alerts.min_age_days.is_finite() && self.alerts.min_age_days >= 0.0) {
            return Err(ConfigError::ValidationError(format!(
                "min_age_days must be >= 0, got {}",
                self.alerts.min_age_days
            )));
        }

        if let Some(floor) = self.alerts.prior_floor {
            if !(floor.is_finite() && floor >= 0.0) {
                return Err(ConfigError::ValidationError(format!(
                    "prior_floor must be >= 0, got {}",
                    floor
                )));
            }
        }

        if self.storage.db_path.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "db_path cannot be empty".to_string(),
            ));
        }

        if self.cycle.loop_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "loop_seconds must be > 0".to_string(),
            ));
        }

        if self.cycle.soft_deadline_secs == Some(0) {
            return Err(ConfigError::ValidationError(
                "soft_deadline_secs must be > 0".to_string(),
            ));
        }

        if self.cycle.probe_workers == 0 {
            return Err(ConfigError::ValidationError(
                "probe_workers must be > 0".to_string(),
            ));
        }

        let level = self.logging.level.to_lowercase();
        if !["trace", "debug", "info", "warn", "error"].contains(&level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "unknown log level '{}'",
                self.logging.level
            )));
        }

        Ok(())
    }
}

impl From<&Config> for LimiterConfig {
    fn from(config: &Config) -> Self {
        let section = &config.limiter;
        let derived = LimiterConfig::from_calls_per_min(section.calls_per_min);
        let max_rps = section.max_rps.unwrap_or(derived.max_rps);
        let min_rps = section.min_rps.unwrap_or(derived.min_rps.min(max_rps));

        LimiterConfig {
            initial_rps: max_rps,
            min_rps,
            max_rps,
            burst_seconds: section.burst_seconds,
            max_concurrency: section.max_concurrency,
            window_size: section.window_size,
            backoff_threshold: section.backoff_threshold,
            recovery_threshold: section.recovery_threshold,
            decrease_factor: section.decrease_factor,
            increase_factor: section.increase_factor,
            retry_after_cap: Duration::try_from_secs_f64(section.retry_after_cap_secs.max(0.0))
                .unwrap_or(derived.retry_after_cap),
            max_server_error_attempts: section.server_error_attempts,
            server_error_backoff: Duration::from_millis(section.server_error_backoff_ms),
            server_error_jitter: Duration::from_millis(section.server_error_jitter_ms),
        }
    }
}

impl From<&Config> for RevivalRule {
    fn from(config: &Config) -> Self {
        let alerts = &config.alerts;
        RevivalRule {
            min_age: Duration::try_from_secs_f64(alerts.min_age_days.max(0.0) * 86_400.0)
                .unwrap_or(Duration::MAX),
            prior_floor: alerts.prior_floor,
            ratio_min: alerts.ratio_min,
            ratio_mode: alerts.ratio_mode,
            recent_window: alerts.recent_window.clone(),
            prior_window: alerts.prior_window.clone(),
        }
    }
}

impl From<&Config> for CoreSettings {
    fn from(config: &Config) -> Self {
        CoreSettings {
            limiter: LimiterConfig::from(config),
            probe_ttl: Duration::from_secs(config.cache.probe_ttl_secs),
            seen_ttl: Duration::from_secs(config.cache.seen_ttl_min.saturating_mul(60)),
            cache_max_entries: config.cache.max_entries,
            rule: RevivalRule::from(config),
        }
    }
}

impl From<&Config> for CycleSettings {
    fn from(config: &Config) -> Self {
        let loop_interval = Duration::from_secs(config.cycle.loop_seconds);
        CycleSettings {
            loop_interval,
            soft_deadline: config
                .cycle
                .soft_deadline_secs
                .map(Duration::from_secs)
                .unwrap_or(loop_interval),
            calls_per_min: config.limiter.calls_per_min,
            safety_reserve: config.budget.safety_reserve,
            fallback_reserve: config.budget.effective_fallback_reserve(),
            min_probes: config.budget.min_probes,
            max_probes: config.budget.max_probes,
            probe_workers: config.cycle.probe_workers,
        }
    }
}
