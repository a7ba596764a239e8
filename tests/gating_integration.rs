//! Alert Gating Integration Tests
//!
//! End-to-end checks across the public API:
//! 1. Concurrent try_fire on one key grants exactly one alert (SQLite and memory)
//! 2. Cooldown timeline: fire, suppressed inside the window, fire again after it
//! 3. Full cycle: ScriptedFetcher -> ThrottledGateway -> Prober -> AlertEvaluator
//!
//! All tests are deterministic (no real network calls) and use scripted data.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use wakewatch::adapters::cooldown::{MemoryCooldownStore, SqliteCooldownStore};
use wakewatch::adapters::http::JsonPointerDecoder;
use wakewatch::adapters::limiter::LimiterConfig;
use wakewatch::application::{
    AlertDecision, AlertEvaluator, Candidate, CoreContext, CoreSettings, CycleSettings,
    ProbeCycle, SuppressCause,
};
use wakewatch::domain::{RevivalRule, WindowMetrics};
use wakewatch::ports::{CooldownStore, ScriptedFetcher, UpstreamRequest, UpstreamResponse};

// ============================================================================
// Test Fixtures
// ============================================================================

const COOLDOWN: Duration = Duration::from_secs(30 * 60);
const DAY: Duration = Duration::from_secs(86_400);

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).unwrap()
}

fn pool_url(id: &str) -> String {
    format!("https://api.example.invalid/pools/{}", id)
}

fn candidate(id: &str, age: Option<Duration>) -> Candidate {
    Candidate::new(UpstreamRequest::new(format!("base:{}", id), pool_url(id)), age)
}

fn metrics_body(recent: f64, prior: f64) -> String {
    format!(r#"{{"data":{{"h1":{},"h24":{}}}}}"#, recent, prior)
}

fn context(fetcher: ScriptedFetcher, store: Arc<dyn CooldownStore>) -> CoreContext {
    let settings = CoreSettings {
        limiter: LimiterConfig::from_calls_per_min(600),
        rule: RevivalRule {
            min_age: DAY * 7,
            ratio_min: 2.0,
            ..RevivalRule::default()
        },
        ..CoreSettings::default()
    };
    CoreContext::new(
        settings,
        Arc::new(fetcher),
        Arc::new(JsonPointerDecoder::new("/data/h1", "/data/h24")),
        store,
    )
    .unwrap()
}

fn cycle_settings() -> CycleSettings {
    CycleSettings {
        calls_per_min: 600,
        probe_workers: 4,
        ..CycleSettings::default()
    }
}

async fn concurrent_fires(store: Arc<dyn CooldownStore>, n: usize) -> usize {
    let mut handles = Vec::with_capacity(n);
    for _ in 0..n {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.try_fire("base:hot", t0()).await.unwrap()
        }));
    }

    let mut granted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            granted += 1;
        }
    }
    granted
}

// ============================================================================
// Concurrent gating
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sqlite_concurrent_fire_grants_one() {
    let dir = TempDir::new().unwrap();
    let store = SqliteCooldownStore::open(&dir.path().join("state.db"), COOLDOWN).unwrap();

    let granted = concurrent_fires(Arc::new(store.clone()), 16).await;

    assert_eq!(granted, 1);
    assert_eq!(store.last_alert_at("base:hot").await.unwrap(), Some(t0()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_memory_concurrent_fire_grants_one() {
    let store = Arc::new(MemoryCooldownStore::new(COOLDOWN));
    let granted = concurrent_fires(store.clone(), 64).await;

    assert_eq!(granted, 1);
    assert_eq!(store.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_store_handles_share_one_ledger() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.db");
    let first = SqliteCooldownStore::open(&path, COOLDOWN).unwrap();
    let second = SqliteCooldownStore::open(&path, COOLDOWN).unwrap();

    let (a, b) = tokio::join!(first.try_fire("base:hot", t0()), second.try_fire("base:hot", t0()));

    assert_ne!(a.unwrap(), b.unwrap());
}

// ============================================================================
// Cooldown timeline
// ============================================================================

#[tokio::test]
async fn test_cooldown_timeline_sqlite() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(SqliteCooldownStore::open(&dir.path().join("state.db"), COOLDOWN).unwrap());
    let evaluator = AlertEvaluator::new(RevivalRule::default(), store.clone());
    let metrics = WindowMetrics::new(1000.0, 400.0);
    let age = Some(DAY * 30);

    let first = evaluator.evaluate("base:pool", metrics, age, t0()).await;
    assert!(first.is_fired());

    let inside = evaluator
        .evaluate("base:pool", metrics, age, t0() + chrono::Duration::seconds(60))
        .await;
    assert!(matches!(
        inside,
        AlertDecision::Suppressed {
            cause: SuppressCause::CooldownActive,
            ..
        }
    ));

    let after = t0() + chrono::Duration::minutes(31);
    let again = evaluator.evaluate("base:pool", metrics, age, after).await;
    assert!(again.is_fired());
    assert_eq!(store.last_alert_at("base:pool").await.unwrap(), Some(after));
}

#[tokio::test]
async fn test_cooldown_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.db");

    {
        let store = SqliteCooldownStore::open(&path, COOLDOWN).unwrap();
        assert!(store.try_fire("base:pool", t0()).await.unwrap());
    }

    let reopened = SqliteCooldownStore::open(&path, COOLDOWN).unwrap();
    let later = t0() + chrono::Duration::minutes(10);
    assert!(reopened.is_active("base:pool", later).await.unwrap());
    assert!(!reopened.try_fire("base:pool", later).await.unwrap());
}

// ============================================================================
// Full probe cycle
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_cycle_fires_once_per_revived_pool() {
    let fetcher = ScriptedFetcher::new()
        .with_response(&pool_url("revived"), UpstreamResponse::new(200, metrics_body(1000.0, 400.0)))
        .with_response(&pool_url("quiet"), UpstreamResponse::new(200, metrics_body(10.0, 400.0)))
        .with_response(&pool_url("young"), UpstreamResponse::new(200, metrics_body(1000.0, 10.0)))
        .with_response(&pool_url("gone"), UpstreamResponse::new(404, "pool not found"));
    let store = Arc::new(MemoryCooldownStore::new(COOLDOWN));
    let cycle = ProbeCycle::new(context(fetcher.clone(), store.clone()), cycle_settings());

    let candidates = vec![
        candidate("revived", Some(DAY * 30)),
        candidate("quiet", Some(DAY * 30)),
        candidate("young", Some(DAY)),
        candidate("gone", Some(DAY * 30)),
    ];

    let deadline = cycle.begin();
    let report = cycle.run(&deadline, candidates, 0).await.unwrap();

    assert_eq!(report.probed, 4);
    assert_eq!(report.api_errors, 1);
    assert_eq!(report.no_match, 2);
    assert_eq!(report.fired.len(), 1);
    assert_eq!(report.fired[0].key, "base:revived");
    assert_eq!(report.counters.requests, 4);
    assert_eq!(fetcher.call_count(), 4);
    assert_eq!(store.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_second_cycle_skips_seen_and_cooling_keys() {
    let fetcher = ScriptedFetcher::new()
        .with_fallback(UpstreamResponse::new(200, metrics_body(1000.0, 400.0)));
    let store = Arc::new(MemoryCooldownStore::new(COOLDOWN));
    let cycle = ProbeCycle::new(context(fetcher.clone(), store.clone()), cycle_settings());

    let first = cycle.begin();
    let report = cycle
        .run(&first, vec![candidate("a", Some(DAY * 30))], 0)
        .await
        .unwrap();
    assert_eq!(report.fired.len(), 1);
    cycle.wait_next(&first).await;

    let second = cycle.begin();
    let report = cycle
        .run(
            &second,
            vec![candidate("a", Some(DAY * 30)), candidate("b", Some(DAY * 30))],
            0,
        )
        .await
        .unwrap();

    assert_eq!(report.skipped_seen, 1);
    assert_eq!(report.fired.len(), 1);
    assert_eq!(report.fired[0].key, "base:b");
    assert_eq!(fetcher.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cycle_respects_probe_quota() {
    let fetcher = ScriptedFetcher::new()
        .with_fallback(UpstreamResponse::new(200, metrics_body(1.0, 1.0)));
    let store = Arc::new(MemoryCooldownStore::new(COOLDOWN));
    let settings = CycleSettings {
        calls_per_min: 28,
        safety_reserve: 4,
        min_probes: 3,
        max_probes: 30,
        ..cycle_settings()
    };
    let cycle = ProbeCycle::new(context(fetcher.clone(), store), settings);

    let candidates = (0..40).map(|i| candidate(&format!("p{}", i), Some(DAY * 30))).collect();
    let deadline = cycle.begin();
    let report = cycle.run(&deadline, candidates, 8).await.unwrap();

    // 28 - 8 discovery - 4 safety
    assert_eq!(report.plan.probe_quota, 16);
    assert_eq!(report.probed, 16);
    assert_eq!(report.over_quota, 24);
    assert_eq!(fetcher.call_count(), 16);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_probe_is_charged_and_not_marked_seen() {
    let fetcher = ScriptedFetcher::new()
        .with_response(
            &pool_url("busy"),
            UpstreamResponse::new(429, "").with_header("Retry-After", "1"),
        )
        .with_response(&pool_url("busy"), UpstreamResponse::new(200, metrics_body(1000.0, 400.0)));
    let store = Arc::new(MemoryCooldownStore::new(COOLDOWN));
    let cycle = ProbeCycle::new(context(fetcher.clone(), store), cycle_settings());

    let deadline = cycle.begin();
    let report = cycle
        .run(&deadline, vec![candidate("busy", Some(DAY * 30))], 0)
        .await
        .unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.counters.rate_limited, 1);
    assert_eq!(report.counters.penalty, Duration::from_secs(1));
    assert!(!cycle.context().seen.get("base:busy"));

    let deadline = cycle.begin();
    let report = cycle
        .run(&deadline, vec![candidate("busy", Some(DAY * 30))], 0)
        .await
        .unwrap();
    assert_eq!(report.fired.len(), 1);
}
