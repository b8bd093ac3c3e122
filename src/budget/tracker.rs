//! Rolling-window token tracking.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::clock::{Clock, SystemClock};
use super::config::WindowBudgetConfig;
use super::persistence::{SnapshotStore, UsageRecord};
use super::wait::{compute_wait, WaitInputs};

/// Status of window utilization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BudgetStatus {
    /// Under 70% of the cap
    Ok,
    /// Approaching the cap
    Warning,
    /// Over 90% of the cap
    Critical,
    /// At or above the cap
    Exceeded,
}

impl BudgetStatus {
    fn from_utilization(fraction: f64) -> Self {
        if fraction >= 1.0 {
            BudgetStatus::Exceeded
        } else if fraction >= 0.9 {
            BudgetStatus::Critical
        } else if fraction >= 0.7 {
            BudgetStatus::Warning
        } else {
            BudgetStatus::Ok
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BudgetStatus::Ok => "OK",
            BudgetStatus::Warning => "WARNING",
            BudgetStatus::Critical => "CRITICAL",
            BudgetStatus::Exceeded => "EXCEEDED",
        }
    }
}

/// Point-in-time view of the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackerStats {
    /// Tokens recorded by this process since construction
    pub total_tokens: u64,
    /// Tokens inside the current window, including those loaded from a snapshot
    pub current_window_usage: u64,
    /// Effective cap
    pub limit: u64,
    /// `current_window_usage / limit` as a percentage
    pub utilization_pct: f64,
}

impl TrackerStats {
    pub fn status(&self) -> BudgetStatus {
        BudgetStatus::from_utilization(self.utilization_pct / 100.0)
    }
}

/// Tracks token usage over a rolling time window.
///
/// History is a FIFO ordered by timestamp: usage is always recorded at "now",
/// so appends go to the back and pruning only ever pops from the front.
/// Pruning happens lazily on every access.
#[derive(Debug)]
pub struct RollingWindowTracker {
    cap: u64,
    window_seconds: f64,
    buffer_seconds: f64,
    history: VecDeque<UsageRecord>,
    store: Option<SnapshotStore>,
    clock: Arc<dyn Clock>,
    total_tokens: u64,
}

impl RollingWindowTracker {
    /// Create an in-memory tracker on the system clock.
    pub fn new(config: &WindowBudgetConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create an in-memory tracker on a custom clock.
    pub fn with_clock(config: &WindowBudgetConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            cap: config.cap(),
            window_seconds: config.window_seconds,
            buffer_seconds: config.wait_buffer_seconds,
            history: VecDeque::new(),
            store: None,
            clock,
            total_tokens: 0,
        }
    }

    /// Create a tracker that restores from and saves to `path`.
    ///
    /// Loaded records are pruned against the current time right away, so a
    /// restarted process only inherits usage that is still inside the window.
    /// An unreadable snapshot is logged and the tracker starts empty.
    pub fn with_persistence(
        config: &WindowBudgetConfig,
        clock: Arc<dyn Clock>,
        path: impl Into<PathBuf>,
    ) -> Self {
        let store = SnapshotStore::new(path);
        let mut tracker = Self::with_clock(config, clock);

        match store.load() {
            Ok(records) => {
                tracker.history = records.into();
                tracker.prune();
                debug!(
                    path = %store.path().display(),
                    records = tracker.history.len(),
                    "restored token window"
                );
            }
            Err(err) => {
                warn!(
                    path = %store.path().display(),
                    error = %err,
                    "could not load token snapshot, starting with an empty window"
                );
            }
        }

        tracker.store = Some(store);
        tracker
    }

    /// Record `tokens` consumed now.
    pub fn record_usage(&mut self, tokens: u64) {
        let now = self.clock.now();
        self.history.push_back(UsageRecord::new(now, tokens));
        self.total_tokens = self.total_tokens.saturating_add(tokens);
        self.prune_at(now);
        self.persist();
    }

    /// Tokens consumed within the last `window_seconds`.
    pub fn usage_in_window(&mut self) -> u64 {
        self.prune();
        self.history
            .iter()
            .map(|record| record.tokens)
            .fold(0u64, u64::saturating_add)
    }

    /// Tokens still available in the current window. Never negative.
    pub fn remaining_budget(&mut self) -> u64 {
        self.cap.saturating_sub(self.usage_in_window())
    }

    /// Seconds to wait before spending `estimated_upcoming` tokens.
    pub fn wait_time(&mut self, estimated_upcoming: u64) -> f64 {
        let usage = self.usage_in_window();
        compute_wait(WaitInputs {
            usage,
            estimated_upcoming,
            cap: self.cap,
            oldest: self.history.front().map(|record| record.timestamp),
            now: self.clock.now(),
            window_seconds: self.window_seconds,
            buffer_seconds: self.buffer_seconds,
        })
    }

    /// Usage summary.
    pub fn stats(&mut self) -> TrackerStats {
        let current_window_usage = self.usage_in_window();
        let utilization_pct = if self.cap == 0 {
            0.0
        } else {
            current_window_usage as f64 / self.cap as f64 * 100.0
        };
        TrackerStats {
            total_tokens: self.total_tokens,
            current_window_usage,
            limit: self.cap,
            utilization_pct,
        }
    }

    pub fn cap(&self) -> u64 {
        self.cap
    }

    pub fn window_seconds(&self) -> f64 {
        self.window_seconds
    }

    /// Records currently held, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &UsageRecord> {
        self.history.iter()
    }

    fn prune(&mut self) {
        let now = self.clock.now();
        self.prune_at(now);
    }

    fn prune_at(&mut self, now: f64) {
        let cutoff = now - self.window_seconds;
        while self
            .history
            .front()
            .is_some_and(|record| record.timestamp < cutoff)
        {
            self.history.pop_front();
        }
    }

    fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(err) = store.save(&self.history) {
            warn!(
                path = %store.path().display(),
                error = %err,
                "could not persist token snapshot"
            );
        }
    }
}
