//! Cooldown Store Adapters
//!
//! - `SqliteCooldownStore`: durable, safe across processes sharing the file
//! - `MemoryCooldownStore`: process-local, for tests and ephemeral runs

mod memory;
mod sqlite;

pub use memory::MemoryCooldownStore;
pub use sqlite::{CooldownRecord, SqliteCooldownStore};
