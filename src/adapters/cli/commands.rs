//! CLI Commands
//!
//! Argument definitions for the wakewatch binary. Handlers live in main.rs.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// wakewatch - revival watcher for rate-limited market data APIs
#[derive(Parser, Debug)]
#[command(
    name = "wakewatch",
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = "Revival watcher for rate-limited market data APIs",
    long_about = "wakewatch probes candidate pools under a shared adaptive rate limit, \
                  compares recent activity against a prior window and fires at most one \
                  alert per pool per cooldown window."
)]
pub struct CliApp {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true, default_value = "wakewatch.toml")]
    pub config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate config and storage, print derived budget and limiter settings
    Check(CheckCmd),

    /// Compute a probe budget from explicit figures
    Budget(BudgetCmd),

    /// Inspect the cooldown ledger
    Cooldown(CooldownCmd),

    /// Fetch one URL through the throttled gateway
    Fetch(FetchCmd),
}

/// Offline health check
#[derive(Args, Debug)]
pub struct CheckCmd {
    /// Discovery calls assumed for the printed plan
    #[arg(long, value_name = "CALLS", default_value = "0")]
    pub discovery: u32,
}

/// Budget calculator
#[derive(Args, Debug)]
pub struct BudgetCmd {
    /// Provider's per-minute call budget
    #[arg(long, value_name = "CALLS", default_value = "28")]
    pub calls_per_min: u32,

    /// Loop interval in seconds
    #[arg(long, value_name = "SECS", default_value = "60")]
    pub loop_seconds: u64,

    /// Discovery calls planned this cycle
    #[arg(long, value_name = "CALLS", default_value = "0")]
    pub discovery: u32,

    #[arg(long, value_name = "CALLS", default_value = "4")]
    pub safety: u32,

    /// Calls reserved for the secondary source
    #[arg(long, value_name = "CALLS", default_value = "0")]
    pub fallback: u32,

    /// Calls already spent (requests + 429s)
    #[arg(long, value_name = "CALLS", default_value = "0")]
    pub spent: u32,

    #[arg(long, value_name = "N", default_value = "3")]
    pub min_probes: u32,

    #[arg(long, value_name = "N", default_value = "30")]
    pub max_probes: u32,

    /// Print the plan as JSON
    #[arg(long)]
    pub json: bool,
}

/// Cooldown ledger commands
#[derive(Args, Debug)]
pub struct CooldownCmd {
    #[command(subcommand)]
    pub action: CooldownAction,
}

#[derive(Subcommand, Debug)]
pub enum CooldownAction {
    /// Show the last alert and remaining cooldown for one key
    Status {
        /// Entity key, e.g. "base:0xabc"
        #[arg(value_name = "KEY")]
        key: String,
    },

    /// List the most recent alerts
    List {
        #[arg(short, long, value_name = "N", default_value = "20")]
        limit: usize,
    },

    /// Delete rows whose cooldown has expired
    Purge,
}

/// One-shot throttled fetch
#[derive(Args, Debug)]
pub struct FetchCmd {
    /// URL to fetch
    #[arg(value_name = "URL")]
    pub url: String,

    /// Cache key for the request (defaults to the URL)
    #[arg(long, value_name = "KEY")]
    pub key: Option<String>,

    /// Extra request header as NAME:VALUE (repeatable)
    #[arg(short = 'H', long = "header", value_name = "NAME:VALUE")]
    pub headers: Vec<String>,

    /// JSON pointer to the recent-window metric
    #[arg(long, value_name = "POINTER", requires = "prior_pointer")]
    pub recent_pointer: Option<String>,

    /// JSON pointer to the prior-window metric
    #[arg(long, value_name = "POINTER", requires = "recent_pointer")]
    pub prior_pointer: Option<String>,

    /// Print the response body
    #[arg(long)]
    pub body: bool,
}

impl FetchCmd {
    /// Split `NAME:VALUE` header arguments, rejecting malformed ones
    pub fn parsed_headers(&self) -> Result<Vec<(String, String)>, String> {
        self.headers
            .iter()
            .map(|raw| match raw.split_once(':') {
                Some((name, value)) if !name.trim().is_empty() => {
                    Ok((name.trim().to_string(), value.trim().to_string()))
                }
                _ => Err(format!("invalid header '{}', expected NAME:VALUE", raw)),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_app_parse_check() {
        let args = vec!["wakewatch", "check", "--config", "test.toml"];
        let app = CliApp::try_parse_from(args).unwrap();

        assert_eq!(app.config, PathBuf::from("test.toml"));
        match app.command {
            Command::Check(cmd) => assert_eq!(cmd.discovery, 0),
            _ => panic!("Expected Check command"),
        }
    }

    #[test]
    fn test_default_config_path() {
        let app = CliApp::try_parse_from(vec!["wakewatch", "check"]).unwrap();
        assert_eq!(app.config, PathBuf::from("wakewatch.toml"));
        assert!(!app.verbose);
        assert!(!app.debug);
    }

    #[test]
    fn test_cli_app_parse_budget() {
        let args = vec![
            "wakewatch", "budget", "--calls-per-min", "28", "--discovery", "8", "--fallback", "3",
            "--spent", "2",
        ];
        let app = CliApp::try_parse_from(args).unwrap();

        match app.command {
            Command::Budget(cmd) => {
                assert_eq!(cmd.calls_per_min, 28);
                assert_eq!(cmd.loop_seconds, 60);
                assert_eq!(cmd.discovery, 8);
                assert_eq!(cmd.safety, 4);
                assert_eq!(cmd.fallback, 3);
                assert_eq!(cmd.spent, 2);
                assert!(!cmd.json);
            }
            _ => panic!("Expected Budget command"),
        }
    }

    #[test]
    fn test_cli_app_parse_cooldown_status() {
        let args = vec!["wakewatch", "--debug", "cooldown", "status", "base:0xabc"];
        let app = CliApp::try_parse_from(args).unwrap();

        assert!(app.debug);
        match app.command {
            Command::Cooldown(CooldownCmd {
                action: CooldownAction::Status { key },
            }) => assert_eq!(key, "base:0xabc"),
            _ => panic!("Expected cooldown status"),
        }
    }

    #[test]
    fn test_cli_app_parse_fetch() {
        let args = vec![
            "wakewatch",
            "fetch",
            "https://api.example.invalid/pools/1",
            "-H",
            "Accept: application/json",
            "--recent-pointer",
            "/data/h1",
            "--prior-pointer",
            "/data/h24",
            "-v",
        ];
        let app = CliApp::try_parse_from(args).unwrap();

        assert!(app.verbose);
        match app.command {
            Command::Fetch(cmd) => {
                assert_eq!(cmd.key, None);
                assert_eq!(cmd.recent_pointer.as_deref(), Some("/data/h1"));
                assert_eq!(
                    cmd.parsed_headers().unwrap(),
                    vec![("Accept".to_string(), "application/json".to_string())]
                );
            }
            _ => panic!("Expected Fetch command"),
        }
    }

    #[test]
    fn test_fetch_pointer_requires_pair() {
        let args = vec!["wakewatch", "fetch", "https://x.invalid", "--recent-pointer", "/a"];
        assert!(CliApp::try_parse_from(args).is_err());
    }

    #[test]
    fn test_malformed_header_rejected() {
        let args = vec!["wakewatch", "fetch", "https://x.invalid", "-H", "no-colon"];
        let app = CliApp::try_parse_from(args).unwrap();
        match app.command {
            Command::Fetch(cmd) => assert!(cmd.parsed_headers().is_err()),
            _ => panic!("Expected Fetch command"),
        }
    }

    #[test]
    fn test_missing_subcommand() {
        assert!(CliApp::try_parse_from(vec!["wakewatch"]).is_err());
    }
}
