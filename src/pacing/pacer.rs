//! Pre-iteration budget decisions.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use super::IterationSpacing;
use crate::budget::{
    Clock, IterationEstimator, RollingWindowTracker, TrackerStats, WindowBudgetConfig,
};

/// How long to hold the next iteration, and why.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacingDecision {
    /// Tokens the next iteration is expected to use
    pub estimated_tokens: u64,
    /// Tokens already used inside the window
    pub window_usage: u64,
    /// Wait demanded by the token window
    pub budget_wait_secs: f64,
    /// Wait demanded by minimum iteration spacing
    pub spacing_wait_secs: f64,
}

impl PacingDecision {
    pub fn wait_secs(&self) -> f64 {
        self.budget_wait_secs.max(self.spacing_wait_secs)
    }

    pub fn must_wait(&self) -> bool {
        self.wait_secs() > 0.0
    }
}

/// Owns the token window and decides when the next iteration may start.
#[derive(Debug)]
pub struct Pacer {
    tracker: RollingWindowTracker,
    estimator: IterationEstimator,
    expected_tool_calls: u64,
    spacing: IterationSpacing,
    clock: Arc<dyn Clock>,
}

impl Pacer {
    /// Build a pacer from budget settings.
    ///
    /// With `tracker_file` the token window is restored from and saved to that
    /// snapshot; without it the window lives in memory only.
    pub fn from_config(
        config: &WindowBudgetConfig,
        clock: Arc<dyn Clock>,
        tracker_file: Option<PathBuf>,
        spacing: IterationSpacing,
    ) -> Self {
        let tracker = match tracker_file {
            Some(path) => RollingWindowTracker::with_persistence(config, clock.clone(), path),
            None => RollingWindowTracker::with_clock(config, clock.clone()),
        };
        Self {
            tracker,
            estimator: IterationEstimator::from_config(config),
            expected_tool_calls: config.expected_tool_calls,
            spacing,
            clock,
        }
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub fn estimated_iteration_cost(&self) -> u64 {
        self.estimator.estimate_cost(self.expected_tool_calls)
    }

    /// Decide whether the next iteration has to wait.
    pub fn plan(&mut self) -> PacingDecision {
        let estimated_tokens = self.estimated_iteration_cost();
        let decision = PacingDecision {
            estimated_tokens,
            window_usage: self.tracker.usage_in_window(),
            budget_wait_secs: self.tracker.wait_time(estimated_tokens),
            spacing_wait_secs: self.spacing.wait_time(self.clock.now()),
        };
        debug!(
            estimated = decision.estimated_tokens,
            usage = decision.window_usage,
            budget_wait_secs = decision.budget_wait_secs,
            spacing_wait_secs = decision.spacing_wait_secs,
            "pacing decision"
        );
        decision
    }

    pub fn mark_iteration_start(&mut self) {
        let now = self.clock.now();
        self.spacing.mark_start(now);
    }

    /// Record the usage an agent reported. Unknown or zero usage adds nothing.
    pub fn record(&mut self, tokens: Option<u64>) {
        match tokens {
            Some(tokens) if tokens > 0 => self.tracker.record_usage(tokens),
            _ => debug!("no token usage to record"),
        }
    }

    pub fn remaining_budget(&mut self) -> u64 {
        self.tracker.remaining_budget()
    }

    pub fn stats(&mut self) -> TrackerStats {
        self.tracker.stats()
    }

    pub fn tracker(&self) -> &RollingWindowTracker {
        &self.tracker
    }
}
