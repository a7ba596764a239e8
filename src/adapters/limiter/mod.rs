//! Adaptive Rate Limiter
//!
//! Token bucket with continuous refill, a concurrency gate, and an RPS
//! controller driven by the 429 fraction of a sliding outcome window.
//! Also owns the Retry-After and 5xx backoff policy used by the gateway.

mod config;
mod error;
mod limiter;
mod types;

pub use config::LimiterConfig;
pub use error::LimiterError;
pub use limiter::{LimiterPermit, RateLimiter};
pub use types::{CycleCounters, LimiterSnapshot};
