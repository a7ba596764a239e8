//! Alert Evaluator
//!
//! Pure rule check followed by cooldown gating. A fire decision is only
//! returned when the cooldown store granted it; if the store cannot be
//! reached the alert is suppressed.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{FireReason, NoMatchReason, ProbeState, RevivalRule, RuleVerdict, WindowMetrics};
use crate::ports::cooldown::CooldownStore;

/// Why a matching alert was not fired
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SuppressCause {
    /// An alert for the key fired within the cooldown window
    CooldownActive,
    /// The cooldown store failed; no alert without a recorded fire
    StoreUnavailable(String),
}

/// Outcome of evaluating one probed entity
#[derive(Debug, Clone, PartialEq)]
pub enum AlertDecision {
    Fired(FireReason),
    Suppressed {
        reason: FireReason,
        cause: SuppressCause,
    },
    NoMatch(NoMatchReason),
}

impl AlertDecision {
    /// Terminal state reached by the entity
    pub fn state(&self) -> ProbeState {
        match self {
            AlertDecision::Fired(_) => ProbeState::Fired,
            AlertDecision::Suppressed { .. } => ProbeState::Suppressed,
            AlertDecision::NoMatch(_) => ProbeState::Probed,
        }
    }

    pub fn is_fired(&self) -> bool {
        matches!(self, AlertDecision::Fired(_))
    }
}

pub struct AlertEvaluator {
    rule: RevivalRule,
    store: Arc<dyn CooldownStore>,
}

impl AlertEvaluator {
    pub fn new(rule: RevivalRule, store: Arc<dyn CooldownStore>) -> Self {
        Self { rule, store }
    }

    pub fn rule(&self) -> &RevivalRule {
        &self.rule
    }

    pub fn store(&self) -> &Arc<dyn CooldownStore> {
        &self.store
    }

    /// Evaluate the rule and, on a match, claim the cooldown slot for `key`
    pub async fn evaluate(
        &self,
        key: &str,
        metrics: WindowMetrics,
        age: Option<Duration>,
        now: DateTime<Utc>,
    ) -> AlertDecision {
        let reason = match self.rule.evaluate(metrics, age) {
            RuleVerdict::Match(reason) => reason,
            RuleVerdict::NoMatch(why) => {
                tracing::debug!("{}: no alert ({})", key, why);
                return AlertDecision::NoMatch(why);
            }
        };

        match self.store.try_fire(key, now).await {
            Ok(true) => {
                tracing::info!("{}: revival alert fired - {}", key, reason);
                AlertDecision::Fired(reason)
            }
            Ok(false) => {
                tracing::debug!("{}: alert suppressed, cooldown active", key);
                AlertDecision::Suppressed {
                    reason,
                    cause: SuppressCause::CooldownActive,
                }
            }
            Err(e) => {
                tracing::warn!("{}: cooldown store unavailable, suppressing alert: {}", key, e);
                AlertDecision::Suppressed {
                    reason,
                    cause: SuppressCause::StoreUnavailable(e.to_string()),
                }
            }
        }
    }
}
