//! Limiter Error Types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LimiterError {
    /// More tokens requested than the bucket can ever hold
    #[error("Requested {requested} tokens exceeds bucket capacity {capacity:.2}")]
    ExceedsCapacity { requested: u32, capacity: f64 },

    /// Concurrency gate was closed (shutdown)
    #[error("Limiter closed")]
    Closed,

    #[error("Invalid limiter configuration: {0}")]
    InvalidConfig(String),
}
