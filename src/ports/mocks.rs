//! Scripted upstream for tests and dry runs
//!
//! Records every request and replays queued responses per URL. Also tracks
//! the peak number of concurrent fetches so concurrency bounds can be checked.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::upstream::{FetchError, UpstreamFetcher, UpstreamRequest, UpstreamResponse};

/// Mock fetcher that records calls and allows controlled responses
#[derive(Debug, Default, Clone)]
pub struct ScriptedFetcher {
    calls: Arc<Mutex<Vec<String>>>,
    responses: Arc<Mutex<HashMap<String, VecDeque<Result<UpstreamResponse, FetchError>>>>>,
    fallback: Arc<Mutex<Option<UpstreamResponse>>>,
    latency: Option<Duration>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to queue a response for a given URL
    pub fn with_response(self, url: &str, response: UpstreamResponse) -> Self {
        self.push(url, Ok(response));
        self
    }

    /// Builder method to queue a transport failure for a given URL
    pub fn with_failure(self, url: &str, error: FetchError) -> Self {
        self.push(url, Err(error));
        self
    }

    /// Response served when nothing is queued for a URL
    pub fn with_fallback(self, response: UpstreamResponse) -> Self {
        *self.fallback.lock().unwrap() = Some(response);
        self
    }

    /// Simulated time spent inside each fetch
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn push(&self, url: &str, response: Result<UpstreamResponse, FetchError>) {
        self.responses
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(response);
    }

    /// Get all recorded calls (URLs, in order)
    pub fn get_calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Highest number of fetches observed running at once
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpstreamFetcher for ScriptedFetcher {
    async fn fetch(&self, request: &UpstreamRequest) -> Result<UpstreamResponse, FetchError> {
        self.calls.lock().unwrap().push(request.url.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let queued = self
            .responses
            .lock()
            .unwrap()
            .get_mut(&request.url)
            .and_then(|q| q.pop_front());

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match queued {
            Some(result) => result,
            None => self
                .fallback
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| FetchError::Transport(format!("No response configured for {}", request.url))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replays_in_order_then_fallback() {
        let fetcher = ScriptedFetcher::new()
            .with_response("u", UpstreamResponse::new(429, ""))
            .with_response("u", UpstreamResponse::new(200, "{}"))
            .with_fallback(UpstreamResponse::new(204, ""));
        let req = UpstreamRequest::new("k", "u");

        assert_eq!(fetcher.fetch(&req).await.unwrap().status, 429);
        assert_eq!(fetcher.fetch(&req).await.unwrap().status, 200);
        assert_eq!(fetcher.fetch(&req).await.unwrap().status, 204);
        assert_eq!(fetcher.call_count(), 3);
    }

    #[tokio::test]
    async fn test_unconfigured_url_is_transport_error() {
        let fetcher = ScriptedFetcher::new();
        let err = fetcher.fetch(&UpstreamRequest::new("k", "nowhere")).await.unwrap_err();
        assert!(matches!(err, FetchError::Transport(_)));
    }
}
