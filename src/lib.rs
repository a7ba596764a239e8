//! wakewatch - revival watcher core
//!
//! Adaptive rate limiting, per-cycle probe budgeting and cooldown-gated
//! alerts for rate-limited market data APIs.
//!
//! # Modules
//!
//! - `domain`: Pure logic (Outcome, BudgetAllocator, RevivalRule, Retry-After parsing)
//! - `ports`: Trait abstractions (UpstreamFetcher, MetricDecoder, CooldownStore)
//! - `adapters`: Implementations (RateLimiter, TTL caches, SQLite ledger, reqwest, CLI)
//! - `config`: Configuration loading and validation
//! - `application`: Gateway, prober, evaluator and the probe cycle

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
