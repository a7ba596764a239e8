//! Domain Layer - Core logic for wakewatch
//!
//! Pure types and functions with no I/O. Everything that touches the network,
//! the clock in a non-trivial way, or the database lives behind the ports layer.
//!
//! - `outcome`: attempt classification and the tagged probe result
//! - `retry_after`: Retry-After header parsing
//! - `budget`: per-cycle probe quota allocation
//! - `revival`: the revival rule used by the alert evaluator

pub mod budget;
pub mod outcome;
pub mod retry_after;
pub mod revival;

pub use budget::{total_budget_for, BudgetAllocator, BudgetInputs, BudgetPlan};
pub use outcome::{Outcome, ProbeResult, WindowMetrics};
pub use retry_after::{capped_delay, parse_retry_after};
pub use revival::{FireReason, NoMatchReason, ProbeState, RatioMode, RevivalRule, RuleVerdict};
