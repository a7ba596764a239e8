//! Ports Layer - Trait definitions for external dependencies
//!
//! This module defines the interfaces (ports) that adapters must implement.
//! Following hexagonal architecture, these traits abstract:
//! - Upstream HTTP access (the fetch itself and decoding of the metric pair)
//! - Durable alert cooldown storage

pub mod cooldown;
pub mod mocks;
pub mod upstream;

pub use cooldown::{CooldownError, CooldownStore};
pub use mocks::ScriptedFetcher;
pub use upstream::{
    DecodeError, FetchError, MetricDecoder, UpstreamFetcher, UpstreamRequest, UpstreamResponse,
};
