//! Core Context
//!
//! Everything a worker needs, constructed once per process and cloned into
//! each task. Cloning only bumps reference counts, so adaptive RPS and cache
//! contents persist across cycles.

use std::sync::Arc;
use std::time::Duration;

use crate::adapters::cache::{SeenCache, TtlCache};
use crate::adapters::limiter::{LimiterConfig, LimiterError, RateLimiter};
use crate::domain::{RevivalRule, WindowMetrics};
use crate::ports::cooldown::CooldownStore;
use crate::ports::upstream::{MetricDecoder, UpstreamFetcher};

use super::evaluator::AlertEvaluator;
use super::gateway::ThrottledGateway;
use super::prober::Prober;

/// Settings for the shared components
#[derive(Debug, Clone)]
pub struct CoreSettings {
    pub limiter: LimiterConfig,
    /// TTL of cached probe metrics
    pub probe_ttl: Duration,
    /// How long a probed key is skipped
    pub seen_ttl: Duration,
    pub cache_max_entries: usize,
    pub rule: RevivalRule,
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self {
            limiter: LimiterConfig::default(),
            probe_ttl: Duration::from_secs(300),
            seen_ttl: Duration::from_secs(600),
            cache_max_entries: TtlCache::<WindowMetrics>::DEFAULT_MAX_ENTRIES,
            rule: RevivalRule::default(),
        }
    }
}

/// Shared components for one upstream provider.
///
/// The limiter, gateway and probe cache are per provider: a process polling
/// two providers with separate quotas builds one context per provider, each
/// with its own `LimiterConfig`. Pass the same `cooldowns` store to every
/// context so alert gating stays global across providers.
#[derive(Clone)]
pub struct CoreContext {
    pub limiter: Arc<RateLimiter>,
    pub gateway: Arc<ThrottledGateway>,
    pub probe_cache: Arc<TtlCache<WindowMetrics>>,
    pub seen: Arc<SeenCache>,
    pub prober: Arc<Prober>,
    pub evaluator: Arc<AlertEvaluator>,
    pub cooldowns: Arc<dyn CooldownStore>,
}

impl CoreContext {
    pub fn new(
        settings: CoreSettings,
        fetcher: Arc<dyn UpstreamFetcher>,
        decoder: Arc<dyn MetricDecoder>,
        cooldowns: Arc<dyn CooldownStore>,
    ) -> Result<Self, LimiterError> {
        let limiter = Arc::new(RateLimiter::new(settings.limiter)?);
        let gateway = Arc::new(ThrottledGateway::new(fetcher, limiter.clone()));
        let probe_cache = Arc::new(TtlCache::new(settings.probe_ttl, settings.cache_max_entries));
        let seen = Arc::new(SeenCache::new(settings.seen_ttl, settings.cache_max_entries));
        let prober = Arc::new(Prober::new(
            gateway.clone(),
            probe_cache.clone(),
            decoder,
            settings.probe_ttl,
        ));
        let evaluator = Arc::new(AlertEvaluator::new(settings.rule, cooldowns.clone()));

        tracing::info!(
            "Core context ready: {:.2} rps (min {:.2}, max {:.2}), {} max in flight",
            limiter.effective_rps(),
            limiter.config().min_rps,
            limiter.config().max_rps,
            limiter.config().max_concurrency
        );

        Ok(Self {
            limiter,
            gateway,
            probe_cache,
            seen,
            prober,
            evaluator,
            cooldowns,
        })
    }
}
