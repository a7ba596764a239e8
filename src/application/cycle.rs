//! Probe Cycle
//!
//! One pass of the polling loop after discovery:
//!
//! 1. budget plan from the limiter's cycle counters
//! 2. drop repeated keys and candidates seen within the seen TTL
//! 3. truncate to the probe quota (input order is priority order)
//! 4. probe on a bounded worker pool, evaluate, gate through cooldowns
//!
//! The soft deadline stops new probes from starting; probes already running
//! are allowed to finish.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::adapters::limiter::CycleCounters;
use crate::domain::{total_budget_for, BudgetAllocator, BudgetInputs, BudgetPlan, FireReason, ProbeResult};
use crate::ports::upstream::UpstreamRequest;

use super::context::CoreContext;
use super::evaluator::AlertDecision;

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("Probe worker pool closed")]
    PoolClosed,
}

/// Cycle scheduling and budget settings
#[derive(Debug, Clone, PartialEq)]
pub struct CycleSettings {
    /// Target duration of one loop iteration
    pub loop_interval: Duration,
    /// No new probes start after this much of the cycle has elapsed
    pub soft_deadline: Duration,
    /// Provider budget in calls per minute
    pub calls_per_min: u32,
    pub safety_reserve: u32,
    /// Calls kept for the secondary source; zero when it is disabled
    pub fallback_reserve: u32,
    pub min_probes: u32,
    pub max_probes: u32,
    /// Probes running at once
    pub probe_workers: usize,
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self {
            loop_interval: Duration::from_secs(60),
            soft_deadline: Duration::from_secs(60),
            calls_per_min: 28,
            safety_reserve: 4,
            fallback_reserve: 0,
            min_probes: 3,
            max_probes: 30,
            probe_workers: 8,
        }
    }
}

impl CycleSettings {
    /// Calls available in one loop interval
    pub fn total_budget(&self) -> u32 {
        total_budget_for(self.calls_per_min, self.loop_interval.as_secs())
    }
}

/// A discovered item eligible for probing
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub request: UpstreamRequest,
    /// Age of the monitored entity, when discovery knows it
    pub age: Option<Duration>,
}

impl Candidate {
    pub fn new(request: UpstreamRequest, age: Option<Duration>) -> Self {
        Self { request, age }
    }

    pub fn key(&self) -> &str {
        &self.request.key
    }
}

/// Soft wall-clock deadline for one cycle
#[derive(Debug, Clone, Copy)]
pub struct CycleDeadline {
    started: Instant,
    deadline: Instant,
}

impl CycleDeadline {
    pub fn starting_now(budget: Duration) -> Self {
        let started = Instant::now();
        Self {
            started,
            deadline: started + budget,
        }
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn started(&self) -> Instant {
        self.started
    }
}

/// An alert that was granted by the cooldown store
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FiredAlert {
    pub key: String,
    pub reason: FireReason,
    pub fired_at: DateTime<Utc>,
}

/// Summary of one cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub plan: BudgetPlan,
    pub candidates: usize,
    /// Repeated keys dropped from the batch
    pub duplicates: usize,
    pub skipped_seen: usize,
    /// Unseen candidates left out by the probe quota
    pub over_quota: usize,
    /// Skipped because an alert for the key is still cooling down
    pub cooldown_skipped: usize,
    /// Selected but not started before the deadline
    pub deferred: usize,
    pub probed: usize,
    pub api_errors: usize,
    pub schema_errors: usize,
    /// No answer from upstream (429, exhausted 5xx, transport, worker panic)
    pub failed: usize,
    pub no_match: usize,
    pub suppressed: usize,
    pub fired: Vec<FiredAlert>,
    pub counters: CycleCounters,
    pub elapsed: Duration,
}

impl CycleReport {
    fn new(plan: BudgetPlan, candidates: usize) -> Self {
        Self {
            plan,
            candidates,
            duplicates: 0,
            skipped_seen: 0,
            over_quota: 0,
            cooldown_skipped: 0,
            deferred: 0,
            probed: 0,
            api_errors: 0,
            schema_errors: 0,
            failed: 0,
            no_match: 0,
            suppressed: 0,
            fired: Vec::new(),
            counters: CycleCounters::default(),
            elapsed: Duration::ZERO,
        }
    }
}

/// What happened to one candidate inside a worker
enum ProbeOutcome {
    CooldownActive,
    Failed(String),
    Probed {
        result: ProbeResult,
        decision: Option<(AlertDecision, DateTime<Utc>)>,
    },
}

pub struct ProbeCycle {
    ctx: CoreContext,
    settings: CycleSettings,
}

impl ProbeCycle {
    pub fn new(ctx: CoreContext, settings: CycleSettings) -> Self {
        Self { ctx, settings }
    }

    pub fn context(&self) -> &CoreContext {
        &self.ctx
    }

    pub fn settings(&self) -> &CycleSettings {
        &self.settings
    }

    /// Start a cycle: reset per-cycle counters and arm the soft deadline.
    ///
    /// Call before discovery so discovery calls are charged to this cycle.
    pub fn begin(&self) -> CycleDeadline {
        self.ctx.limiter.reset_cycle_counters();
        CycleDeadline::starting_now(self.settings.soft_deadline)
    }

    /// Probe quota given the calls spent so far this cycle
    pub fn plan(&self, discovery_cost: u32) -> BudgetPlan {
        let counters = self.ctx.limiter.cycle_counters();
        BudgetAllocator::plan(BudgetInputs {
            total_budget: self.settings.total_budget(),
            discovery_cost,
            safety_reserve: self.settings.safety_reserve,
            fallback_reserve: self.settings.fallback_reserve,
            spent_so_far: counters.spent_calls(),
            min_probes: self.settings.min_probes,
            max_probes: self.settings.max_probes,
        })
    }

    /// Filter, probe and evaluate the discovered candidates
    pub async fn run(
        &self,
        deadline: &CycleDeadline,
        candidates: Vec<Candidate>,
        discovery_cost: u32,
    ) -> Result<CycleReport, CycleError> {
        let plan = self.plan(discovery_cost);
        tracing::info!(
            "Budget: total={} discovery={} safety={} fallback={} spent={} available={} quota={}",
            plan.inputs.total_budget,
            plan.inputs.discovery_cost,
            plan.inputs.safety_reserve,
            plan.inputs.fallback_reserve,
            plan.inputs.spent_so_far,
            plan.available,
            plan.probe_quota
        );

        let mut report = CycleReport::new(plan, candidates.len());

        // first occurrence wins; later copies would spend a second quota slot
        let mut keys = HashSet::with_capacity(candidates.len());
        let unique: Vec<Candidate> = candidates
            .into_iter()
            .filter(|c| keys.insert(c.key().to_string()))
            .collect();
        report.duplicates = report.candidates - unique.len();

        let unseen = self.ctx.seen.retain_unseen(unique, |c| c.key());
        report.skipped_seen = report.candidates - report.duplicates - unseen.len();

        let quota = plan.probe_quota as usize;
        report.over_quota = unseen.len().saturating_sub(quota);
        let selected: Vec<Candidate> = unseen.into_iter().take(quota).collect();

        let workers = Arc::new(Semaphore::new(self.settings.probe_workers.max(1)));
        let mut tasks = JoinSet::new();
        let mut remaining = selected.len();

        for candidate in selected {
            let slot = workers
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| CycleError::PoolClosed)?;

            if deadline.expired() {
                tracing::warn!(
                    "Cycle deadline reached after {:?}, deferring {} probes",
                    deadline.elapsed(),
                    remaining
                );
                report.deferred = remaining;
                break;
            }
            remaining -= 1;

            let ctx = self.ctx.clone();
            tasks.spawn(async move {
                let outcome = probe_one(&ctx, &candidate).await;
                drop(slot);
                (candidate.request.key, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((key, outcome)) => tally(&mut report, key, outcome),
                Err(e) => {
                    tracing::error!("Probe worker failed: {}", e);
                    report.failed += 1;
                }
            }
        }

        self.ctx.seen.purge_expired();
        self.ctx.probe_cache.purge_expired(Instant::now());

        report.counters = self.ctx.limiter.cycle_counters();
        report.elapsed = deadline.elapsed();

        let snapshot = self.ctx.limiter.snapshot();
        tracing::info!(
            "Cycle done in {:?}: candidates={} seen={} probed={} failed={} fired={} suppressed={} deferred={} | requests={} 429s={} penalty={:?} rps={:.2}",
            report.elapsed,
            report.candidates,
            report.skipped_seen,
            report.probed,
            report.failed,
            report.fired.len(),
            report.suppressed,
            report.deferred,
            report.counters.requests,
            report.counters.rate_limited,
            report.counters.penalty,
            snapshot.effective_rps
        );

        Ok(report)
    }

    /// Sleep out the rest of the loop interval
    pub async fn wait_next(&self, deadline: &CycleDeadline) {
        tokio::time::sleep_until(deadline.started() + self.settings.loop_interval).await;
    }
}

async fn probe_one(ctx: &CoreContext, candidate: &Candidate) -> ProbeOutcome {
    let key = candidate.key();

    match ctx.cooldowns.is_active(key, Utc::now()).await {
        Ok(true) => return ProbeOutcome::CooldownActive,
        Ok(false) => {}
        // try_fire fails closed later; probing is still worth it
        Err(e) => tracing::warn!("{}: cooldown lookup failed: {}", key, e),
    }

    let result = match ctx.prober.probe(&candidate.request).await {
        Ok(result) => result,
        Err(e) => return ProbeOutcome::Failed(e.to_string()),
    };

    ctx.seen.put(key);

    let decision = match result.metrics() {
        Some(metrics) => {
            let now = Utc::now();
            let decision = ctx.evaluator.evaluate(key, metrics, candidate.age, now).await;
            Some((decision, now))
        }
        None => None,
    };

    ProbeOutcome::Probed { result, decision }
}

fn tally(report: &mut CycleReport, key: String, outcome: ProbeOutcome) {
    match outcome {
        ProbeOutcome::CooldownActive => report.cooldown_skipped += 1,
        ProbeOutcome::Failed(e) => {
            tracing::warn!("{}: probe failed: {}", key, e);
            report.failed += 1;
        }
        ProbeOutcome::Probed { result, decision } => {
            report.probed += 1;
            match result {
                ProbeResult::ApiError { code, message } => {
                    tracing::warn!("{}: upstream error {}: {}", key, code, message);
                    report.api_errors += 1;
                }
                ProbeResult::SchemaError { detail } => {
                    tracing::warn!("{}: unexpected response shape: {}", key, detail);
                    report.schema_errors += 1;
                }
                ProbeResult::Ok(_) => {}
            }
            match decision {
                Some((AlertDecision::Fired(reason), fired_at)) => {
                    report.fired.push(FiredAlert {
                        key,
                        reason,
                        fired_at,
                    });
                }
                Some((AlertDecision::Suppressed { .. }, _)) => report.suppressed += 1,
                Some((AlertDecision::NoMatch(_), _)) => report.no_match += 1,
                None => {}
            }
        }
    }
}
