//! Upstream access port
//!
//! Provider-specific URL construction and response schemas live outside the
//! core. The core only needs a way to issue a request and a way to pull the
//! recent/prior metric pair out of a successful body.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::domain::WindowMetrics;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FetchError {
    #[error("Transport failure: {0}")]
    Transport(String),
    #[error("Request timed out")]
    Timeout,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    #[error("Body is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("Missing field: {0}")]
    MissingField(String),
    #[error("Field {0} is not numeric")]
    NotNumeric(String),
}

/// A single upstream request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamRequest {
    /// Logical identity used for caching and dedup (never the raw URL)
    pub key: String,
    pub url: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
}

impl UpstreamRequest {
    pub fn new(key: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            url: url.into(),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Raw upstream response
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpstreamResponse {
    pub status: u16,
    /// Header names are stored lowercased
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl UpstreamResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues one HTTP request. Implementations must not retry on their own;
/// retry and throttling policy belongs to the gateway.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UpstreamFetcher: Send + Sync {
    async fn fetch(&self, request: &UpstreamRequest) -> Result<UpstreamResponse, FetchError>;
}

/// Extracts the metric pair from a successful response body
pub trait MetricDecoder: Send + Sync {
    fn decode(&self, body: &str) -> Result<WindowMetrics, DecodeError>;
}
