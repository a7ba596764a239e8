//! HTTP Adapter
//!
//! reqwest-backed `UpstreamFetcher` and a JSON-pointer `MetricDecoder`.

mod client;
mod decoder;

pub use client::{HttpConfig, ReqwestFetcher};
pub use decoder::JsonPointerDecoder;
