//! Revival Rule
//!
//! Pure evaluation of the "wake-up" condition: activity in a short recent
//! window compared against an older, non-overlapping comparison window.
//!
//! Window lengths are labels only; the caller decides what "recent" and
//! "prior" mean (1h/24h, 1h/48h, 24h/168h ...). The ratio formula is
//! selected by [`RatioMode`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::outcome::WindowMetrics;

/// How the comparison denominator is derived from the prior metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatioMode {
    /// recent / prior
    #[default]
    Direct,
    /// recent / (prior - recent); the prior figure is a total that includes the recent window
    ExcludeRecent,
}

/// Lifecycle of a monitored key within one evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProbeState {
    Unseen,
    Probed,
    Fired,
    Suppressed,
}

/// Why the rule did not match
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum NoMatchReason {
    /// Entity is younger than the configured minimum, or its age is unknown
    TooYoung,
    /// Prior metric is negative or below the configured floor
    BelowFloor { prior: f64, floor: f64 },
    /// Comparison window is empty; a ratio would be meaningless
    ZeroPrior,
    /// Ratio computed but under the threshold
    RatioTooLow { ratio: f64, ratio_min: f64 },
}

impl fmt::Display for NoMatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoMatchReason::TooYoung => write!(f, "entity below minimum age"),
            NoMatchReason::BelowFloor { prior, floor } => {
                write!(f, "prior {:.2} below floor {:.2}", prior, floor)
            }
            NoMatchReason::ZeroPrior => write!(f, "prior window is zero"),
            NoMatchReason::RatioTooLow { ratio, ratio_min } => {
                write!(f, "ratio {:.2} < {:.2}", ratio, ratio_min)
            }
        }
    }
}

/// Payload attached to a fired alert
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FireReason {
    pub recent: f64,
    /// Denominator actually used for the ratio
    pub comparison: f64,
    pub ratio: f64,
    pub ratio_min: f64,
    pub recent_window: String,
    pub prior_window: String,
}

impl fmt::Display for FireReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:.2} vs {} {:.2} -> ratio {:.2}x (min {:.2}x)",
            self.recent_window,
            self.recent,
            self.prior_window,
            self.comparison,
            self.ratio,
            self.ratio_min
        )
    }
}

/// Rule verdict, before any cooldown gating
#[derive(Debug, Clone, PartialEq)]
pub enum RuleVerdict {
    Match(FireReason),
    NoMatch(NoMatchReason),
}

impl RuleVerdict {
    pub fn is_match(&self) -> bool {
        matches!(self, RuleVerdict::Match(_))
    }
}

/// Revival rule parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevivalRule {
    /// Minimum entity age before it can "revive"
    pub min_age: Duration,
    /// Optional floor on the prior metric
    pub prior_floor: Option<f64>,
    /// Minimum recent/prior ratio
    pub ratio_min: f64,
    pub ratio_mode: RatioMode,
    /// Label of the recent window (e.g. "1h")
    pub recent_window: String,
    /// Label of the comparison window (e.g. "prev 24h")
    pub prior_window: String,
}

impl Default for RevivalRule {
    fn default() -> Self {
        Self {
            min_age: Duration::from_secs(7 * 24 * 3600),
            prior_floor: None,
            ratio_min: 2.0,
            ratio_mode: RatioMode::Direct,
            recent_window: "recent".to_string(),
            prior_window: "prior".to_string(),
        }
    }
}

impl RevivalRule {
    /// Evaluate the rule. Pure: the same inputs always give the same verdict.
    pub fn evaluate(&self, metrics: WindowMetrics, age: Option<Duration>) -> RuleVerdict {
        match age {
            Some(age) if age >= self.min_age => {}
            _ => return RuleVerdict::NoMatch(NoMatchReason::TooYoung),
        }

        let comparison = match self.ratio_mode {
            RatioMode::Direct => metrics.prior,
            RatioMode::ExcludeRecent => (metrics.prior - metrics.recent).max(0.0),
        };

        let floor = self.prior_floor.unwrap_or(0.0).max(0.0);
        if !(comparison >= floor) {
            return RuleVerdict::NoMatch(NoMatchReason::BelowFloor {
                prior: comparison,
                floor,
            });
        }

        if comparison <= 0.0 {
            return RuleVerdict::NoMatch(NoMatchReason::ZeroPrior);
        }

        let ratio = metrics.recent / comparison;
        if !(ratio >= self.ratio_min) {
            return RuleVerdict::NoMatch(NoMatchReason::RatioTooLow {
                ratio,
                ratio_min: self.ratio_min,
            });
        }

        RuleVerdict::Match(FireReason {
            recent: metrics.recent,
            comparison,
            ratio,
            ratio_min: self.ratio_min,
            recent_window: self.recent_window.clone(),
            prior_window: self.prior_window.clone(),
        })
    }
}
