//! Configuration Module
//!
//! Loads and validates configuration from TOML files.

pub mod loader;

pub use loader::{
    AlertsSection, BudgetSection, CacheSection, Config, ConfigError, CycleSection,
    LimiterSection, LoggingSection, StorageSection, DB_PATH_ENV, load_config,
};
