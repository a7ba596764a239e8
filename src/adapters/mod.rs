//! Adapters Layer - External System Implementations
//!
//! - Limiter: token bucket with adaptive rate and concurrency gate
//! - Cache: TTL caches for probe results and seen keys
//! - Cooldown: SQLite and in-memory cooldown ledgers
//! - HTTP: reqwest fetcher and JSON pointer decoder
//! - CLI: Command-line interface definitions

pub mod cache;
pub mod cli;
pub mod cooldown;
pub mod http;
pub mod limiter;

pub use cache::{SeenCache, TtlCache};
pub use cli::CliApp;
pub use cooldown::{MemoryCooldownStore, SqliteCooldownStore};
pub use http::{JsonPointerDecoder, ReqwestFetcher};
pub use limiter::{LimiterConfig, RateLimiter};
