//! Expiring Caches
//!
//! Sharded TTL cache for probe results and a presence-only "seen" list used
//! to skip candidates that were recently handled.

mod seen;
mod ttl;

pub use seen::SeenCache;
pub use ttl::{CacheStats, TtlCache};
