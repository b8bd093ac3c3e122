//! Up-front cost estimation for a unit of work.
//!
//! Actual consumption is only known once the agent finishes, yet the pacing
//! decision has to be made before it starts. Every tool call the agent makes
//! is one model request that re-sends the conversation so far, so cost is
//! modelled as a fixed context overhead plus a per-call increment.

use serde::{Deserialize, Serialize};

use super::config::WindowBudgetConfig;

/// Heuristic upper bound on the tokens an iteration will consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationEstimator {
    /// Fixed context cost (system prompt, task, state file)
    base_overhead: u64,
    /// Cost added per expected tool call
    per_unit_cost: u64,
}

impl Default for IterationEstimator {
    fn default() -> Self {
        Self::new(3_000, 2_000)
    }
}

impl IterationEstimator {
    /// Create an estimator with explicit constants.
    pub fn new(base_overhead: u64, per_unit_cost: u64) -> Self {
        Self {
            base_overhead,
            per_unit_cost,
        }
    }

    /// Create an estimator from the window budget config.
    pub fn from_config(config: &WindowBudgetConfig) -> Self {
        Self::new(config.base_overhead_tokens, config.tokens_per_tool_call)
    }

    /// Estimate tokens for a unit of work expected to make `work_size_hint` tool calls.
    pub fn estimate_cost(&self, work_size_hint: u64) -> u64 {
        self.base_overhead
            .saturating_add(work_size_hint.saturating_mul(self.per_unit_cost))
    }

    pub fn base_overhead(&self) -> u64 {
        self.base_overhead
    }

    pub fn per_unit_cost(&self) -> u64 {
        self.per_unit_cost
    }
}
