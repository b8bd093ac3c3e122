//! Rolling-window budget configuration.

use serde::{Deserialize, Serialize};

/// Default provider limit in tokens per window (gpt-4o-mini tier).
pub const DEFAULT_TOKEN_LIMIT: u64 = 150_000;

/// Configuration for the rolling token window and its estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowBudgetConfig {
    /// Limit declared by the provider for one window
    pub token_limit: u64,

    /// Fraction of the declared limit actually used (0.0 < margin <= 1.0)
    pub safety_margin: f64,

    /// Length of the rolling window in seconds
    pub window_seconds: f64,

    /// Extra seconds added to computed waits to absorb clock skew and jitter
    pub wait_buffer_seconds: f64,

    /// Fixed context cost of one unit of work (tokens)
    pub base_overhead_tokens: u64,

    /// Marginal cost of each expected tool call (tokens)
    pub tokens_per_tool_call: u64,

    /// Tool calls a single iteration is expected to make
    pub expected_tool_calls: u64,
}

impl Default for WindowBudgetConfig {
    fn default() -> Self {
        Self {
            token_limit: DEFAULT_TOKEN_LIMIT,
            safety_margin: 0.9,         // Use 90% of the declared limit
            window_seconds: 60.0,       // Per-minute quotas
            wait_buffer_seconds: 2.0,
            base_overhead_tokens: 3_000,
            tokens_per_tool_call: 2_000,
            expected_tool_calls: 8,
        }
    }
}

impl WindowBudgetConfig {
    /// Create a config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the declared per-window token limit.
    pub fn with_token_limit(mut self, tokens: u64) -> Self {
        self.token_limit = tokens;
        self
    }

    /// Set the safety margin.
    pub fn with_safety_margin(mut self, margin: f64) -> Self {
        self.safety_margin = margin;
        self
    }

    /// Set the window length in seconds.
    pub fn with_window_seconds(mut self, secs: f64) -> Self {
        self.window_seconds = secs;
        self
    }

    /// Set the wake-up buffer added to computed waits.
    pub fn with_wait_buffer(mut self, secs: f64) -> Self {
        self.wait_buffer_seconds = secs;
        self
    }

    /// Set the estimator constants.
    pub fn with_estimator(mut self, base_overhead: u64, per_tool_call: u64) -> Self {
        self.base_overhead_tokens = base_overhead;
        self.tokens_per_tool_call = per_tool_call;
        self
    }

    /// Set the number of tool calls one iteration is expected to make.
    pub fn with_expected_tool_calls(mut self, calls: u64) -> Self {
        self.expected_tool_calls = calls;
        self
    }

    /// Effective cap: declared limit scaled by the safety margin.
    pub fn cap(&self) -> u64 {
        // The epsilon absorbs float error so 30_000 * 0.85 yields 25_500.
        (self.token_limit as f64 * self.safety_margin + 1e-6).floor() as u64
    }

    /// Check the values for internal consistency.
    pub fn validate(&self) -> Result<(), String> {
        if self.token_limit == 0 {
            return Err("token_limit must be positive".to_string());
        }
        if !(self.safety_margin > 0.0 && self.safety_margin <= 1.0) {
            return Err(format!(
                "safety_margin must be in (0, 1], got {}",
                self.safety_margin
            ));
        }
        if !(self.window_seconds.is_finite() && self.window_seconds > 0.0) {
            return Err(format!(
                "window_seconds must be positive, got {}",
                self.window_seconds
            ));
        }
        if !(self.wait_buffer_seconds.is_finite() && self.wait_buffer_seconds >= 0.0) {
            return Err(format!(
                "wait_buffer_seconds must be non-negative, got {}",
                self.wait_buffer_seconds
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = WindowBudgetConfig::default();
        assert_eq!(config.token_limit, 150_000);
        assert_eq!(config.cap(), 135_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cap_applies_margin() {
        let config = WindowBudgetConfig::new()
            .with_token_limit(1_000)
            .with_safety_margin(0.9);
        assert_eq!(config.cap(), 900);

        let config = WindowBudgetConfig::new()
            .with_token_limit(30_000)
            .with_safety_margin(0.85);
        assert_eq!(config.cap(), 25_500);
    }

    #[test]
    fn test_builder_pattern() {
        let config = WindowBudgetConfig::new()
            .with_window_seconds(30.0)
            .with_wait_buffer(0.5)
            .with_estimator(1_000, 500)
            .with_expected_tool_calls(4);

        assert_eq!(config.window_seconds, 30.0);
        assert_eq!(config.wait_buffer_seconds, 0.5);
        assert_eq!(config.base_overhead_tokens, 1_000);
        assert_eq!(config.tokens_per_tool_call, 500);
        assert_eq!(config.expected_tool_calls, 4);
    }

    #[test]
    fn test_validate_rejects_bad_margin() {
        assert!(WindowBudgetConfig::new().with_safety_margin(0.0).validate().is_err());
        assert!(WindowBudgetConfig::new().with_safety_margin(1.5).validate().is_err());
        assert!(WindowBudgetConfig::new().with_safety_margin(1.0).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_window() {
        assert!(WindowBudgetConfig::new().with_window_seconds(0.0).validate().is_err());
        assert!(WindowBudgetConfig::new().with_wait_buffer(-1.0).validate().is_err());
        assert!(WindowBudgetConfig::new().with_token_limit(0).validate().is_err());
    }
}
