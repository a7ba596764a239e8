//! Probe Budget Allocator
//!
//! Splits the per-cycle call quota between discovery and probing.
//!
//! available = max(0, total - discovery - safety - fallback - spent)
//! quota     = clamp(available, min_probes, max_probes)
//!
//! Recomputed from fresh counters every cycle; nothing is cached here.

use serde::{Deserialize, Serialize};

/// Inputs for one cycle's budget computation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetInputs {
    /// Calls allowed per loop interval
    pub total_budget: u32,
    /// Discovery calls already planned for this cycle
    pub discovery_cost: u32,
    /// Calls kept in hand for retries and surprises
    pub safety_reserve: u32,
    /// Calls reserved for the secondary data source
    pub fallback_reserve: u32,
    /// Calls already charged this cycle (requests + 429 penalties)
    pub spent_so_far: u32,
    /// Lower bound on probes per cycle
    pub min_probes: u32,
    /// Upper bound on probes per cycle
    pub max_probes: u32,
}

/// Full breakdown of a budget decision, for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BudgetPlan {
    pub inputs: BudgetInputs,
    /// Calls left after all deductions, before clamping
    pub available: u32,
    /// Final probe quota
    pub probe_quota: u32,
}

/// Stateless per-cycle allocator
pub struct BudgetAllocator;

impl BudgetAllocator {
    /// Compute the probe quota for one cycle
    pub fn compute(
        total_budget: u32,
        discovery_cost: u32,
        safety_reserve: u32,
        fallback_reserve: u32,
        spent_so_far: u32,
        min_probes: u32,
        max_probes: u32,
    ) -> u32 {
        Self::plan(BudgetInputs {
            total_budget,
            discovery_cost,
            safety_reserve,
            fallback_reserve,
            spent_so_far,
            min_probes,
            max_probes,
        })
        .probe_quota
    }

    /// Compute the quota and keep the intermediate figures
    pub fn plan(inputs: BudgetInputs) -> BudgetPlan {
        let available = inputs
            .total_budget
            .saturating_sub(inputs.discovery_cost)
            .saturating_sub(inputs.safety_reserve)
            .saturating_sub(inputs.fallback_reserve)
            .saturating_sub(inputs.spent_so_far);

        // max wins over min if they are ever inverted
        let probe_quota = available.max(inputs.min_probes).min(inputs.max_probes);

        BudgetPlan {
            inputs,
            available,
            probe_quota,
        }
    }
}

/// Calls allowed in one loop interval at the given per-minute rate
pub fn total_budget_for(calls_per_min: u32, loop_seconds: u64) -> u32 {
    let total = (calls_per_min as u64).saturating_mul(loop_seconds) / 60;
    total.min(u32::MAX as u64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_cycle() {
        assert_eq!(BudgetAllocator::compute(28, 8, 4, 3, 2, 3, 30), 11);
    }

    #[test]
    fn test_exhausted_budget_clamps_to_min() {
        let plan = BudgetAllocator::plan(BudgetInputs {
            total_budget: 10,
            discovery_cost: 8,
            safety_reserve: 4,
            fallback_reserve: 3,
            spent_so_far: 2,
            min_probes: 3,
            max_probes: 30,
        });
        assert_eq!(plan.available, 0);
        assert_eq!(plan.probe_quota, 3);
    }

    #[test]
    fn test_large_budget_clamps_to_max() {
        assert_eq!(BudgetAllocator::compute(500, 8, 4, 3, 2, 3, 30), 30);
    }

    #[test]
    fn test_inverted_bounds_max_wins() {
        assert_eq!(BudgetAllocator::compute(100, 0, 0, 0, 0, 10, 5), 5);
    }

    #[test]
    fn test_total_budget_for_interval() {
        assert_eq!(total_budget_for(28, 60), 28);
        assert_eq!(total_budget_for(28, 30), 14);
        assert_eq!(total_budget_for(30, 90), 45);
        assert_eq!(total_budget_for(0, 60), 0);
    }
}
