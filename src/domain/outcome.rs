//! Attempt Outcomes and Probe Results
//!
//! Classification of upstream attempts as seen by the rate limiter, and the
//! tagged result type handed to the alert layer after a probe.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of a single upstream attempt, as fed back into the limiter window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    /// Request completed with a non-throttled, non-server-error status
    Success,
    /// HTTP 429
    RateLimited,
    /// HTTP 5xx
    ServerError,
    /// Transport failure or a client error other than 429
    Failed,
}

impl Outcome {
    /// Classify an HTTP status code
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => Outcome::RateLimited,
            500..=599 => Outcome::ServerError,
            400..=499 => Outcome::Failed,
            _ => Outcome::Success,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Outcome::RateLimited)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => write!(f, "success"),
            Outcome::RateLimited => write!(f, "rate_limited"),
            Outcome::ServerError => write!(f, "server_error"),
            Outcome::Failed => write!(f, "failed"),
        }
    }
}

/// Metric pair for one monitored entity: a short recent window and an older
/// comparison window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowMetrics {
    /// Activity in the recent window (e.g. last hour volume)
    pub recent: f64,
    /// Activity in the comparison window
    pub prior: f64,
}

impl WindowMetrics {
    pub fn new(recent: f64, prior: f64) -> Self {
        Self { recent, prior }
    }
}

/// Tagged result of probing one candidate
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeResult {
    /// Metrics decoded from a successful response (or served from cache)
    Ok(WindowMetrics),
    /// Upstream answered with a non-success status
    ApiError { code: u16, message: String },
    /// Upstream answered 2xx but the body did not carry the metric pair
    SchemaError { detail: String },
}

impl ProbeResult {
    pub fn metrics(&self) -> Option<WindowMetrics> {
        match self {
            ProbeResult::Ok(m) => Some(*m),
            _ => None,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ProbeResult::Ok(_))
    }
}
