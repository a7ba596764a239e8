//! Prober
//!
//! Cache-fronted probe of one candidate. Only decoded metrics are cached;
//! API and schema errors are returned to the caller every time.

use std::sync::Arc;
use std::time::Duration;

use crate::adapters::cache::TtlCache;
use crate::domain::{ProbeResult, WindowMetrics};
use crate::ports::upstream::{MetricDecoder, UpstreamRequest};

use super::gateway::{GatewayError, ThrottledGateway};

/// Maximum characters of an error body kept in `ProbeResult::ApiError`
const ERROR_BODY_CHARS: usize = 200;

/// Why a fetch produced no cacheable metrics
enum Uncached {
    Result(ProbeResult),
    Gateway(GatewayError),
}

pub struct Prober {
    gateway: Arc<ThrottledGateway>,
    cache: Arc<TtlCache<WindowMetrics>>,
    decoder: Arc<dyn MetricDecoder>,
    ttl: Duration,
}

impl Prober {
    pub fn new(
        gateway: Arc<ThrottledGateway>,
        cache: Arc<TtlCache<WindowMetrics>>,
        decoder: Arc<dyn MetricDecoder>,
        ttl: Duration,
    ) -> Self {
        Self {
            gateway,
            cache,
            decoder,
            ttl,
        }
    }

    /// Probe one candidate.
    ///
    /// `Err` means no answer at all (throttled, exhausted 5xx, transport);
    /// an upstream answer that carries no metrics is an `Ok` result variant.
    pub async fn probe(&self, request: &UpstreamRequest) -> Result<ProbeResult, GatewayError> {
        let fetched: Result<WindowMetrics, Uncached> = self
            .cache
            .get_or_fetch(&request.key, self.ttl, || async {
                let response = match self.gateway.fetch(request).await {
                    Ok(response) => response,
                    Err(e) => return Err(Uncached::Gateway(e)),
                };

                if !response.is_success() {
                    return Err(Uncached::Result(ProbeResult::ApiError {
                        code: response.status,
                        message: response.body.chars().take(ERROR_BODY_CHARS).collect(),
                    }));
                }

                self.decoder.decode(&response.body).map_err(|e| {
                    Uncached::Result(ProbeResult::SchemaError {
                        detail: e.to_string(),
                    })
                })
            })
            .await;

        match fetched {
            Ok(metrics) => Ok(ProbeResult::Ok(metrics)),
            Err(Uncached::Result(result)) => Ok(result),
            Err(Uncached::Gateway(e)) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::http::JsonPointerDecoder;
    use crate::adapters::limiter::{LimiterConfig, RateLimiter};
    use crate::ports::mocks::ScriptedFetcher;
    use crate::ports::upstream::UpstreamResponse;

    const URL: &str = "https://example.invalid/pool";

    fn prober(fetcher: ScriptedFetcher) -> Prober {
        let limiter = Arc::new(RateLimiter::new(LimiterConfig::from_calls_per_min(600)).unwrap());
        let gateway = Arc::new(ThrottledGateway::new(Arc::new(fetcher), limiter));
        Prober::new(
            gateway,
            Arc::new(TtlCache::new(Duration::from_secs(60), 100)),
            Arc::new(JsonPointerDecoder::new("/recent", "/prior")),
            Duration::from_secs(60),
        )
    }

    fn request() -> UpstreamRequest {
        UpstreamRequest::new("base:pool", URL)
    }

    #[tokio::test(start_paused = true)]
    async fn test_metrics_cached_after_first_probe() {
        let fetcher = ScriptedFetcher::new()
            .with_response(URL, UpstreamResponse::new(200, r#"{"recent":10,"prior":4}"#));
        let prober = prober(fetcher.clone());

        for _ in 0..3 {
            let result = prober.probe(&request()).await.unwrap();
            assert_eq!(result, ProbeResult::Ok(WindowMetrics::new(10.0, 4.0)));
        }
        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_api_error_not_cached() {
        let fetcher = ScriptedFetcher::new()
            .with_response(URL, UpstreamResponse::new(404, "no such pool"))
            .with_response(URL, UpstreamResponse::new(200, r#"{"recent":1,"prior":1}"#));
        let prober = prober(fetcher.clone());

        let first = prober.probe(&request()).await.unwrap();
        assert_eq!(
            first,
            ProbeResult::ApiError {
                code: 404,
                message: "no such pool".into()
            }
        );

        let second = prober.probe(&request()).await.unwrap();
        assert!(second.is_ok());
        assert_eq!(fetcher.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_schema_error() {
        let fetcher = ScriptedFetcher::new()
            .with_response(URL, UpstreamResponse::new(200, r#"{"recent":1}"#));
        let result = prober(fetcher).probe(&request()).await.unwrap();
        assert!(matches!(result, ProbeResult::SchemaError { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_is_error() {
        let fetcher = ScriptedFetcher::new().with_response(URL, UpstreamResponse::new(429, ""));
        let err = prober(fetcher).probe(&request()).await.unwrap_err();
        assert!(matches!(err, GatewayError::RateLimited { .. }));
    }
}
