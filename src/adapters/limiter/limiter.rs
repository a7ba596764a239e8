//! Rate Limiter
//!
//! Bucket state sits behind a short std mutex that is never held across an
//! await; waiting for tokens happens outside the lock. The concurrency gate
//! is a tokio semaphore whose permit travels with the caller.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use super::config::LimiterConfig;
use super::error::LimiterError;
use super::types::{CycleCounters, LimiterSnapshot};
use crate::domain::{capped_delay, Outcome};

/// Token bucket plus adaptive controller state
#[derive(Debug)]
struct BucketState {
    capacity: f64,
    tokens: f64,
    effective_rps: f64,
    last_refill: Instant,
    window: VecDeque<Outcome>,
}

impl BucketState {
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            self.tokens = (self.tokens + elapsed * self.effective_rps).min(self.capacity);
            self.last_refill = now;
        }
    }

    fn projected_tokens(&self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        (self.tokens + elapsed * self.effective_rps).min(self.capacity)
    }

    fn rate_limited_fraction(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        let limited = self.window.iter().filter(|o| o.is_rate_limited()).count();
        limited as f64 / self.window.len() as f64
    }
}

/// RAII concurrency slot. Dropping it frees the slot.
#[derive(Debug)]
pub struct LimiterPermit {
    _slot: OwnedSemaphorePermit,
}

/// Adaptive token-bucket rate limiter
#[derive(Debug)]
pub struct RateLimiter {
    config: LimiterConfig,
    bucket: Mutex<BucketState>,
    gate: Arc<Semaphore>,
    counters: Mutex<CycleCounters>,
}

impl RateLimiter {
    /// Create a limiter with a full bucket
    pub fn new(config: LimiterConfig) -> Result<Self, LimiterError> {
        config.validate()?;

        let effective_rps = config.clamped_initial_rps();
        let capacity = config.capacity_for(effective_rps);
        let gate = Arc::new(Semaphore::new(config.max_concurrency));

        Ok(Self {
            bucket: Mutex::new(BucketState {
                capacity,
                tokens: capacity,
                effective_rps,
                last_refill: Instant::now(),
                window: VecDeque::with_capacity(config.window_size),
            }),
            counters: Mutex::new(CycleCounters::default()),
            gate,
            config,
        })
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    fn bucket(&self) -> MutexGuard<'_, BucketState> {
        self.bucket.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn counters(&self) -> MutexGuard<'_, CycleCounters> {
        self.counters.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Wait for a concurrency slot and `n` tokens.
    ///
    /// Only the calling task is suspended. The slot is held until the
    /// returned permit is dropped.
    pub async fn acquire(&self, n: u32) -> Result<LimiterPermit, LimiterError> {
        let wanted = n as f64;
        self.check_capacity(n, wanted)?;

        let slot = self
            .gate
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| LimiterError::Closed)?;

        loop {
            let wait = {
                let mut bucket = self.bucket();
                bucket.refill(Instant::now());

                // capacity can shrink while we wait
                if wanted > bucket.capacity {
                    return Err(LimiterError::ExceedsCapacity {
                        requested: n,
                        capacity: bucket.capacity,
                    });
                }

                if bucket.tokens >= wanted {
                    bucket.tokens -= wanted;
                    None
                } else {
                    let deficit = wanted - bucket.tokens;
                    let secs = deficit / bucket.effective_rps.max(f64::EPSILON);
                    Some((Duration::from_secs_f64(secs), bucket.effective_rps))
                }
            };

            match wait {
                None => return Ok(LimiterPermit { _slot: slot }),
                Some((delay, rate)) => {
                    tracing::debug!("Throttling for {:?} @ {:.2} rps", delay, rate);
                    tokio::time::sleep(delay.max(Duration::from_millis(1))).await;
                }
            }
        }
    }

    fn check_capacity(&self, n: u32, wanted: f64) -> Result<(), LimiterError> {
        let capacity = self.bucket().capacity;
        if wanted > capacity {
            return Err(LimiterError::ExceedsCapacity {
                requested: n,
                capacity,
            });
        }
        Ok(())
    }

    /// Feed one completed attempt back into the controller
    pub fn report(&self, outcome: Outcome) {
        {
            let mut counters = self.counters();
            counters.requests = counters.requests.saturating_add(1);
            if outcome.is_rate_limited() {
                counters.rate_limited = counters.rate_limited.saturating_add(1);
            }
        }

        let mut bucket = self.bucket();
        bucket.window.push_back(outcome);
        while bucket.window.len() > self.config.window_size {
            bucket.window.pop_front();
        }
        if bucket.window.len() < self.config.window_size {
            return;
        }

        let fraction = bucket.rate_limited_fraction();
        let old = bucket.effective_rps;

        let new_rps = if fraction > self.config.backoff_threshold {
            (old * self.config.decrease_factor).max(self.config.min_rps)
        } else if fraction < self.config.recovery_threshold {
            (old * self.config.increase_factor).min(self.config.max_rps)
        } else {
            old
        };

        if new_rps == old {
            return;
        }

        let now = Instant::now();
        bucket.refill(now);
        bucket.effective_rps = new_rps;
        bucket.capacity = self.config.capacity_for(new_rps);
        bucket.tokens = bucket.tokens.min(bucket.capacity);
        bucket.window.clear();
        drop(bucket);

        if new_rps < old {
            tracing::info!(
                "High 429 rate {:.0}% -> decrease RPS {:.2} -> {:.2}",
                fraction * 100.0,
                old,
                new_rps
            );
        } else {
            tracing::info!(
                "429 rate normalized {:.0}% -> increase RPS {:.2} -> {:.2}",
                fraction * 100.0,
                old,
                new_rps
            );
        }
    }

    /// Capped delay derived from a Retry-After header value
    pub fn retry_after_delay(&self, header: Option<&str>) -> Duration {
        match header {
            Some(value) => capped_delay(value, self.config.retry_after_cap, Utc::now()),
            None => Duration::ZERO,
        }
    }

    /// Backoff before the next attempt after the `attempt`-th 5xx (1-based)
    pub fn server_error_backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let base = self.config.server_error_backoff.saturating_mul(1u32 << exp);
        let jitter_ms = self.config.server_error_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        base + Duration::from_millis(jitter)
    }

    pub fn max_server_error_attempts(&self) -> u32 {
        self.config.max_server_error_attempts
    }

    /// Current state, without applying refill or touching the window
    pub fn snapshot(&self) -> LimiterSnapshot {
        let bucket = self.bucket();
        let available = self.gate.available_permits();
        LimiterSnapshot {
            effective_rps: bucket.effective_rps,
            tokens: bucket.projected_tokens(Instant::now()),
            capacity: bucket.capacity,
            rate_limited_percent: bucket.rate_limited_fraction() * 100.0,
            concurrency_in_use: self.config.max_concurrency.saturating_sub(available),
            max_concurrency: self.config.max_concurrency,
        }
    }

    pub fn effective_rps(&self) -> f64 {
        self.bucket().effective_rps
    }

    /// Zero the per-cycle counters. Bucket and rate are left alone.
    pub fn reset_cycle_counters(&self) {
        *self.counters() = CycleCounters::default();
    }

    pub fn cycle_counters(&self) -> CycleCounters {
        *self.counters()
    }

    /// Record time spent sleeping on Retry-After
    pub fn add_penalty(&self, delay: Duration) {
        let mut counters = self.counters();
        counters.penalty = counters.penalty.saturating_add(delay);
    }
}
