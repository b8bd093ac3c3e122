//! Rolling-window token budget for Ralph.
//!
//! Provider quotas are expressed per minute, but each Ralph iteration is an
//! independent agent run whose usage is only known after it finishes. This
//! module keeps a short history of actual consumption and answers the one
//! question the loop asks before every iteration: how long to wait so the
//! next run fits under the quota.
//!
//! # Overview
//!
//! - **WindowBudgetConfig**: declared limit, safety margin, window, estimator constants
//! - **RollingWindowTracker**: FIFO of usage records, pruned lazily, optionally persisted
//! - **IterationEstimator**: up-front cost of an iteration from its expected tool calls
//! - **compute_wait**: seconds until the oldest record frees enough room
//! - **SnapshotStore**: JSON snapshot so a restarted process remembers recent usage
//! - **TokenUsageParser**: actual usage pulled from agent output
//!
//! # Example
//!
//! ```ignore
//! use ralph_pacer::budget::{IterationEstimator, RollingWindowTracker, WindowBudgetConfig};
//!
//! let config = WindowBudgetConfig::default().with_token_limit(30_000);
//! let mut tracker = RollingWindowTracker::new(&config);
//! let estimate = IterationEstimator::from_config(&config).estimate_cost(8);
//!
//! let wait = tracker.wait_time(estimate);
//! // sleep `wait` seconds, run the agent, then:
//! tracker.record_usage(12_345);
//! ```

mod clock;
mod config;
mod estimator;
mod parser;
mod persistence;
mod tracker;
mod wait;

pub use clock::{Clock, SystemClock};
pub use config::{WindowBudgetConfig, DEFAULT_TOKEN_LIMIT};
pub use estimator::IterationEstimator;
pub use parser::{ParsedTokenUsage, TokenUsageParser};
pub use persistence::{PersistenceError, PersistenceResult, SnapshotStore, UsageRecord};
pub use tracker::{BudgetStatus, RollingWindowTracker, TrackerStats};
pub use wait::{compute_wait, WaitInputs};

#[cfg(test)]
pub(crate) use clock::ManualClock;
