//! wakewatch - revival watcher core
//!
//! Offline checks, budget arithmetic, cooldown ledger inspection and
//! one-shot throttled fetches.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use wakewatch::adapters::cli::{BudgetCmd, CheckCmd, CliApp, Command, CooldownAction, CooldownCmd, FetchCmd};
use wakewatch::adapters::cooldown::SqliteCooldownStore;
use wakewatch::adapters::http::{JsonPointerDecoder, ReqwestFetcher};
use wakewatch::adapters::limiter::{LimiterConfig, RateLimiter};
use wakewatch::application::{CycleSettings, ThrottledGateway};
use wakewatch::config::{load_config, Config, ConfigError};
use wakewatch::domain::{total_budget_for, BudgetAllocator, BudgetInputs, BudgetPlan};
use wakewatch::ports::{CooldownStore, MetricDecoder, UpstreamRequest};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (WAKEWATCH_DB_PATH and friends)
    dotenvy::dotenv().ok();

    let app = CliApp::parse();
    let config = load_config(&app.config);
    let level = config.as_ref().ok().map(|c| c.logging.level.clone());
    init_logging(app.verbose, app.debug, level.as_deref())?;

    match app.command {
        Command::Check(cmd) => {
            let config = config
                .with_context(|| format!("Failed to load configuration from {}", app.config.display()))?;
            check_command(cmd, config).await
        }
        Command::Budget(cmd) => budget_command(cmd),
        Command::Cooldown(cmd) => {
            let config = config
                .with_context(|| format!("Failed to load configuration from {}", app.config.display()))?;
            cooldown_command(cmd, config).await
        }
        Command::Fetch(cmd) => fetch_command(cmd, config_or_default(config)).await,
    }
}

fn init_logging(verbose: bool, debug: bool, config_level: Option<&str>) -> Result<()> {
    let filter = if debug {
        EnvFilter::new("debug")
    } else if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config_level.unwrap_or("warn")))
    };

    fmt().with_env_filter(filter).with_target(false).init();
    Ok(())
}

fn config_or_default(config: Result<Config, ConfigError>) -> Config {
    match config {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Using default configuration: {}", e);
            Config::default()
        }
    }
}

/// Handle check command
async fn check_command(cmd: CheckCmd, config: Config) -> Result<()> {
    tracing::info!("Running offline health check...");

    let db_path = config.storage.get_db_path();
    let store = SqliteCooldownStore::open(&db_path, config.alerts.cooldown())
        .with_context(|| format!("Database at {} is not usable", db_path.display()))?;
    let purged = store
        .purge_expired(Utc::now())
        .await
        .context("Database is not writable")?;

    let limiter = RateLimiter::new(LimiterConfig::from(&config))
        .context("Invalid limiter settings")?;
    let settings = CycleSettings::from(&config);
    let plan = BudgetAllocator::plan(BudgetInputs {
        total_budget: settings.total_budget(),
        discovery_cost: cmd.discovery,
        safety_reserve: settings.safety_reserve,
        fallback_reserve: settings.fallback_reserve,
        spent_so_far: 0,
        min_probes: settings.min_probes,
        max_probes: settings.max_probes,
    });

    println!("✓ Configuration valid");
    println!("✓ Database writable: {} ({} expired rows purged)", db_path.display(), purged);
    println!();
    print_limiter(limiter.config());
    println!();
    print_plan(&plan);
    println!();
    println!("Alerts:");
    println!("  Cooldown: {} min", config.alerts.cooldown_min);
    println!("  Min age: {} days", config.alerts.min_age_days);
    println!(
        "  Ratio: {} vs {} >= {:.2}x ({:?})",
        config.alerts.recent_window,
        config.alerts.prior_window,
        config.alerts.ratio_min,
        config.alerts.ratio_mode
    );
    Ok(())
}

/// Handle budget command
fn budget_command(cmd: BudgetCmd) -> Result<()> {
    if cmd.loop_seconds == 0 {
        bail!("--loop-seconds must be > 0");
    }

    let plan = BudgetAllocator::plan(BudgetInputs {
        total_budget: total_budget_for(cmd.calls_per_min, cmd.loop_seconds),
        discovery_cost: cmd.discovery,
        safety_reserve: cmd.safety,
        fallback_reserve: cmd.fallback,
        spent_so_far: cmd.spent,
        min_probes: cmd.min_probes,
        max_probes: cmd.max_probes,
    });

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print_plan(&plan);
    }
    Ok(())
}

/// Handle cooldown subcommands
async fn cooldown_command(cmd: CooldownCmd, config: Config) -> Result<()> {
    let db_path = config.storage.get_db_path();
    let store = SqliteCooldownStore::open(&db_path, config.alerts.cooldown())
        .with_context(|| format!("Failed to open cooldown database {}", db_path.display()))?;
    let now = Utc::now();

    match cmd.action {
        CooldownAction::Status { key } => {
            match store.last_alert_at(&key).await? {
                None => println!("{}: never alerted", key),
                Some(last) => {
                    let active = store.is_active(&key, now).await?;
                    println!("{}: last alert {}", key, last.to_rfc3339());
                    if active {
                        let until = last + chrono::Duration::from_std(store.cooldown())?;
                        println!("  Cooldown active, {} min remaining", (until - now).num_minutes());
                    } else {
                        println!("  Cooldown expired");
                    }
                }
            }
        }
        CooldownAction::List { limit } => {
            let records = store.recent(limit).await?;
            if records.is_empty() {
                println!("No alerts recorded");
            }
            for record in records {
                let active = store.is_active(&record.key, now).await?;
                println!(
                    "{}  {}{}",
                    record.last_alert_at.to_rfc3339(),
                    record.key,
                    if active { "  (cooling down)" } else { "" }
                );
            }
        }
        CooldownAction::Purge => {
            let purged = store.purge_expired(now).await?;
            println!("Purged {} expired cooldown rows", purged);
        }
    }
    Ok(())
}

/// Handle fetch command
async fn fetch_command(cmd: FetchCmd, config: Config) -> Result<()> {
    let headers = cmd.parsed_headers().map_err(anyhow::Error::msg)?;
    let mut request = UpstreamRequest::new(cmd.key.clone().unwrap_or_else(|| cmd.url.clone()), &cmd.url);
    for (name, value) in headers {
        request = request.with_header(name, value);
    }

    let fetcher = ReqwestFetcher::new().context("Failed to create HTTP client")?;
    let limiter = Arc::new(
        RateLimiter::new(LimiterConfig::from(&config)).context("Invalid limiter settings")?,
    );
    let gateway = ThrottledGateway::new(Arc::new(fetcher), limiter.clone());

    tracing::info!("Fetching {}", cmd.url);
    let result = gateway.fetch(&request).await;

    match &result {
        Ok(response) => {
            println!("Status: {}", response.status);
            println!("Body: {} bytes", response.body.len());
            if cmd.body {
                println!("{}", response.body);
            }
            if let (Some(recent), Some(prior)) = (&cmd.recent_pointer, &cmd.prior_pointer) {
                let decoder = JsonPointerDecoder::new(recent.as_str(), prior.as_str());
                match decoder.decode(&response.body) {
                    Ok(metrics) => println!(
                        "Metrics: recent {:.2}, prior {:.2}",
                        metrics.recent, metrics.prior
                    ),
                    Err(e) => println!("Metrics: schema error ({})", e),
                }
            }
        }
        Err(e) => println!("Fetch failed: {}", e),
    }

    println!();
    println!("Limiter:");
    println!("{}", serde_json::to_string_pretty(&limiter.snapshot())?);
    let counters = limiter.cycle_counters();
    println!(
        "Spent: {} calls ({} requests, {} rate limited, {:.1}s penalty)",
        counters.spent_calls(),
        counters.requests,
        counters.rate_limited,
        counters.penalty.as_secs_f64()
    );

    result.map(|_| ()).context("Throttled fetch failed")
}

fn print_limiter(config: &LimiterConfig) {
    println!("Limiter:");
    println!(
        "  Rate: {:.3} rps (min {:.3}, max {:.3}), burst {:.1}s",
        config.initial_rps, config.min_rps, config.max_rps, config.burst_seconds
    );
    println!("  Max in flight: {}", config.max_concurrency);
    println!(
        "  Adaptive: window {}, back off above {:.0}% x{:.2}, recover below {:.0}% x{:.2}",
        config.window_size,
        config.backoff_threshold * 100.0,
        config.decrease_factor,
        config.recovery_threshold * 100.0,
        config.increase_factor
    );
    println!(
        "  Retry-After cap {:.1}s, 5xx attempts {}",
        config.retry_after_cap.as_secs_f64(),
        config.max_server_error_attempts
    );
}

fn print_plan(plan: &BudgetPlan) {
    let inputs = &plan.inputs;
    println!("Budget plan:");
    println!("  Total:      {}", inputs.total_budget);
    println!("  Discovery: -{}", inputs.discovery_cost);
    println!("  Safety:    -{}", inputs.safety_reserve);
    println!("  Fallback:  -{}", inputs.fallback_reserve);
    println!("  Spent:     -{}", inputs.spent_so_far);
    println!("  Available:  {}", plan.available);
    println!(
        "  Probe quota: {} (bounds {}..={})",
        plan.probe_quota, inputs.min_probes, inputs.max_probes
    );
}
