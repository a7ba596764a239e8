//! CLI Adapter
//!
//! Command-line interface for wakewatch.
//! Uses clap derive macros for argument parsing.

mod commands;

pub use commands::{BudgetCmd, CheckCmd, CliApp, Command, CooldownAction, CooldownCmd, FetchCmd};
