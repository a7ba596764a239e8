//! Cooldown storage port
//!
//! At-most-one alert per key per cooldown window. `try_fire` is the only
//! mutating operation and must be an atomic check-and-set.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CooldownError {
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Storage task failed: {0}")]
    Task(String),
    #[error("Invalid stored timestamp for key {0}")]
    InvalidTimestamp(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CooldownStore: Send + Sync {
    /// Length of the cooldown window
    fn cooldown(&self) -> Duration;

    /// True iff an entry exists and `now - last_alert_at < cooldown`
    async fn is_active(&self, key: &str, now: DateTime<Utc>) -> Result<bool, CooldownError>;

    /// Atomically record `now` for the key if it is not active.
    ///
    /// Returns true when permission to alert was granted.
    async fn try_fire(&self, key: &str, now: DateTime<Utc>) -> Result<bool, CooldownError>;

    /// Last recorded alert time, if any
    async fn last_alert_at(&self, key: &str) -> Result<Option<DateTime<Utc>>, CooldownError>;
}

/// Shared window check used by the store implementations
pub(crate) fn within_window(last: DateTime<Utc>, now: DateTime<Utc>, cooldown: Duration) -> bool {
    let elapsed = now.signed_duration_since(last);
    match chrono::Duration::from_std(cooldown) {
        Ok(window) => elapsed < window,
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_window_edges() {
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let cd = Duration::from_secs(1800);
        assert!(within_window(t0, t0, cd));
        assert!(within_window(t0, t0 + chrono::Duration::seconds(60), cd));
        assert!(!within_window(t0, t0 + chrono::Duration::seconds(1800), cd));
        assert!(!within_window(t0, t0 + chrono::Duration::minutes(31), cd));
    }

    #[test]
    fn test_clock_behind_last_alert_stays_active() {
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert!(within_window(t0, t0 - chrono::Duration::seconds(5), Duration::from_secs(10)));
    }
}
