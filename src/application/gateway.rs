//! Throttled Gateway
//!
//! Every upstream call goes through here: acquire from the limiter, fetch,
//! classify, report, then apply the 429 / 5xx policy. The concurrency slot
//! is given back before any Retry-After or backoff sleep.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::adapters::limiter::{LimiterError, RateLimiter};
use crate::domain::Outcome;
use crate::ports::upstream::{FetchError, UpstreamFetcher, UpstreamRequest, UpstreamResponse};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Limiter(#[from] LimiterError),

    #[error("Rate limited (429), waited {waited:?}")]
    RateLimited { waited: Duration },

    #[error("Server error {status} after {attempts} attempts")]
    ServerErrorExhausted { status: u16, attempts: u32 },

    #[error(transparent)]
    Transport(#[from] FetchError),
}

/// Result of one gateway call; non-429 4xx responses come back as `Ok`
pub type FetchOutcome = Result<UpstreamResponse, GatewayError>;

pub struct ThrottledGateway {
    fetcher: Arc<dyn UpstreamFetcher>,
    limiter: Arc<RateLimiter>,
}

impl ThrottledGateway {
    pub fn new(fetcher: Arc<dyn UpstreamFetcher>, limiter: Arc<RateLimiter>) -> Self {
        Self { fetcher, limiter }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Issue a request under the limiter's policy
    pub async fn fetch(&self, request: &UpstreamRequest) -> FetchOutcome {
        let max_attempts = self.limiter.max_server_error_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;

            let permit = self.limiter.acquire(1).await?;
            let result = self.fetcher.fetch(request).await;
            drop(permit);

            let response = match result {
                Ok(response) => response,
                Err(e) => {
                    self.limiter.report(Outcome::Failed);
                    tracing::warn!("Transport failure for {}: {}", request.key, e);
                    return Err(e.into());
                }
            };

            let outcome = Outcome::from_status(response.status);
            self.limiter.report(outcome);

            match outcome {
                Outcome::RateLimited => {
                    let delay = self.limiter.retry_after_delay(response.header("retry-after"));
                    tracing::warn!(
                        "429 for {} - sleeping {:?} before next call",
                        request.key,
                        delay
                    );
                    if !delay.is_zero() {
                        self.limiter.add_penalty(delay);
                        tokio::time::sleep(delay).await;
                    }
                    return Err(GatewayError::RateLimited { waited: delay });
                }
                Outcome::ServerError => {
                    if attempt >= max_attempts {
                        tracing::warn!(
                            "Server error {} for {} (attempt {}/{}), giving up",
                            response.status,
                            request.key,
                            attempt,
                            max_attempts
                        );
                        return Err(GatewayError::ServerErrorExhausted {
                            status: response.status,
                            attempts: attempt,
                        });
                    }
                    let backoff = self.limiter.server_error_backoff(attempt);
                    tracing::warn!(
                        "Server error {} for {}, retrying in {:?} (attempt {}/{})",
                        response.status,
                        request.key,
                        backoff,
                        attempt,
                        max_attempts
                    );
                    tokio::time::sleep(backoff).await;
                }
                Outcome::Success | Outcome::Failed => return Ok(response),
            }
        }
    }
}
