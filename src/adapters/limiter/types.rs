//! Limiter observability types

use serde::Serialize;
use std::time::Duration;

/// Point-in-time view of the limiter
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LimiterSnapshot {
    pub effective_rps: f64,
    /// Tokens available right now (refill projected, not applied)
    pub tokens: f64,
    pub capacity: f64,
    /// Share of 429s in the current outcome window, 0-100
    pub rate_limited_percent: f64,
    pub concurrency_in_use: usize,
    pub max_concurrency: usize,
}

/// Per-cycle accounting, reset at the start of every cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleCounters {
    /// Completed attempts, whatever their outcome
    pub requests: u32,
    /// Attempts answered with 429
    pub rate_limited: u32,
    /// Time spent sleeping on Retry-After
    pub penalty: Duration,
}

impl CycleCounters {
    /// Calls charged against the cycle budget; each 429 costs one extra call
    pub fn spent_calls(&self) -> u32 {
        self.requests.saturating_add(self.rate_limited)
    }
}
