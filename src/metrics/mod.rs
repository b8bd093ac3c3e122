//! Run metrics for Ralph.
//!
//! One snapshot per loop invocation, written to
//! `<workspace>/.ralph/runs/<run-id>.json` when the run ends.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// Metrics for a single iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationMetrics {
    /// Iteration number
    pub iteration: u64,
    /// Tokens the agent reported (0 when unknown)
    pub tokens: u64,
    /// Time spent waiting for budget before the iteration started
    pub wait: Duration,
    /// Time spent executing, retries included
    pub duration: Duration,
    /// Agent attempts, including retries after rate limits
    pub attempts: u32,
    /// Whether the agent finished normally
    pub success: bool,
    /// Error message if the iteration failed
    pub error: Option<String>,
    /// Timestamp when the iteration completed
    pub completed_at: DateTime<Utc>,
}

impl IterationMetrics {
    pub fn new(iteration: u64) -> Self {
        Self {
            iteration,
            tokens: 0,
            wait: Duration::ZERO,
            duration: Duration::ZERO,
            attempts: 0,
            success: false,
            error: None,
            completed_at: Utc::now(),
        }
    }
}

/// Aggregated metrics for a single run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    /// Unique run identifier
    pub run_id: String,
    /// Task the run worked on
    pub task: String,
    /// Timestamp when run started
    pub started_at: DateTime<Utc>,
    /// Timestamp when run completed
    pub completed_at: DateTime<Utc>,
    /// Total run duration
    pub run_duration: Duration,
    /// Iterations handed to the agent
    pub iterations_attempted: u32,
    /// Iterations the agent finished normally
    pub iterations_completed: u32,
    /// Iterations that failed or ended early
    pub failures: u32,
    /// Total retry count across iterations
    pub retries: u32,
    /// Tokens reported across all iterations
    pub total_tokens: u64,
    /// Time spent in pacing waits
    pub total_wait: Duration,
    /// Detailed iteration metrics
    pub iterations: Vec<IterationMetrics>,
}

#[derive(Debug)]
struct RunMetricsState {
    run_id: String,
    task: String,
    started_at: DateTime<Utc>,
    started_instant: Instant,
    iterations: Vec<IterationMetrics>,
}

/// Thread-safe run metrics collector.
#[derive(Debug, Clone)]
pub struct RunMetricsCollector {
    inner: Arc<Mutex<RunMetricsState>>,
}

impl RunMetricsCollector {
    pub fn new(run_id: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RunMetricsState {
                run_id: run_id.into(),
                task: task.into(),
                started_at: Utc::now(),
                started_instant: Instant::now(),
                iterations: Vec::new(),
            })),
        }
    }

    /// Generate a run ID using timestamp and process ID.
    pub fn generate_run_id() -> String {
        let millis = Utc::now().timestamp_millis();
        let pid = std::process::id();
        format!("run-{}-{}", millis, pid)
    }

    pub fn run_id(&self) -> String {
        self.inner
            .lock()
            .map(|state| state.run_id.clone())
            .unwrap_or_else(|_| "run-unknown".to_string())
    }

    /// Record a finished iteration.
    pub fn record_iteration(&self, metrics: IterationMetrics) {
        if let Ok(mut state) = self.inner.lock() {
            state.iterations.push(metrics);
        }
    }

    /// Build a run metrics snapshot.
    pub fn finish(&self) -> RunMetrics {
        let completed_at = Utc::now();
        let Ok(state) = self.inner.lock() else {
            return RunMetrics {
                run_id: "run-unknown".to_string(),
                task: String::new(),
                started_at: completed_at,
                completed_at,
                run_duration: Duration::ZERO,
                iterations_attempted: 0,
                iterations_completed: 0,
                failures: 0,
                retries: 0,
                total_tokens: 0,
                total_wait: Duration::ZERO,
                iterations: Vec::new(),
            };
        };

        let iterations_attempted = state.iterations.len() as u32;
        let iterations_completed = state.iterations.iter().filter(|it| it.success).count() as u32;
        let retries = state
            .iterations
            .iter()
            .map(|it| it.attempts.saturating_sub(1))
            .sum();

        RunMetrics {
            run_id: state.run_id.clone(),
            task: state.task.clone(),
            started_at: state.started_at,
            completed_at,
            run_duration: state.started_instant.elapsed(),
            iterations_attempted,
            iterations_completed,
            failures: iterations_attempted.saturating_sub(iterations_completed),
            retries,
            total_tokens: state.iterations.iter().map(|it| it.tokens).fold(0, u64::saturating_add),
            total_wait: state.iterations.iter().map(|it| it.wait).sum(),
            iterations: state.iterations.clone(),
        }
    }
}

/// Store run metrics snapshots on disk.
#[derive(Debug, Clone)]
pub struct RunMetricsStore {
    runs_dir: PathBuf,
}

impl RunMetricsStore {
    /// Create a store under `<base_dir>/.ralph/runs`.
    pub fn new(base_dir: impl Into<PathBuf>) -> io::Result<Self> {
        let runs_dir = base_dir.into().join(".ralph").join("runs");
        std::fs::create_dir_all(&runs_dir)?;
        Ok(Self { runs_dir })
    }

    /// Save run metrics to disk.
    pub fn save(&self, metrics: &RunMetrics) -> io::Result<PathBuf> {
        let path = self.runs_dir.join(format!("{}.json", metrics.run_id));
        let temp_path = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(metrics).map_err(io::Error::other)?;
        let mut file = std::fs::File::create(&temp_path)?;
        use std::io::Write;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        std::fs::rename(&temp_path, &path)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn iteration(n: u64, tokens: u64, attempts: u32, success: bool) -> IterationMetrics {
        IterationMetrics {
            tokens,
            attempts,
            success,
            wait: Duration::from_secs(n),
            error: (!success).then(|| "agent failed".to_string()),
            ..IterationMetrics::new(n)
        }
    }

    #[test]
    fn test_generate_run_id_format() {
        let id = RunMetricsCollector::generate_run_id();
        assert!(id.starts_with("run-"));
        assert!(id.ends_with(&std::process::id().to_string()));
    }

    #[test]
    fn test_finish_aggregates_iterations() {
        let collector = RunMetricsCollector::new("run-1", "write docs");
        collector.record_iteration(iteration(1, 12_000, 1, true));
        collector.record_iteration(iteration(2, 0, 3, false));
        collector.record_iteration(iteration(3, 9_000, 2, true));

        let metrics = collector.finish();
        assert_eq!(metrics.run_id, "run-1");
        assert_eq!(metrics.task, "write docs");
        assert_eq!(metrics.iterations_attempted, 3);
        assert_eq!(metrics.iterations_completed, 2);
        assert_eq!(metrics.failures, 1);
        assert_eq!(metrics.retries, 3);
        assert_eq!(metrics.total_tokens, 21_000);
        assert_eq!(metrics.total_wait, Duration::from_secs(6));
    }

    #[test]
    fn test_collector_clones_share_state() {
        let collector = RunMetricsCollector::new("run-2", "task");
        let handle = collector.clone();
        handle.record_iteration(iteration(1, 5, 1, true));

        assert_eq!(collector.finish().iterations.len(), 1);
        assert_eq!(collector.run_id(), "run-2");
    }

    #[test]
    fn test_store_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = RunMetricsStore::new(temp_dir.path()).unwrap();

        let collector = RunMetricsCollector::new("run-3", "task");
        collector.record_iteration(iteration(1, 100, 1, true));
        let metrics = collector.finish();

        let path = store.save(&metrics).unwrap();
        assert_eq!(path, temp_dir.path().join(".ralph/runs/run-3.json"));
        assert!(!path.with_extension("json.tmp").exists());

        let saved: RunMetrics = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved, metrics);
    }
}
