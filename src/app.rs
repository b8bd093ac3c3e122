//! Wires configuration, workspace, pacer and agent into one run.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::agent::CommandExecutor;
use crate::budget::{Clock, SystemClock};
use crate::config::RalphConfig;
use crate::error::{RalphError, Result};
use crate::metrics::{RunMetricsCollector, RunMetricsStore};
use crate::pacing::{IterationLoop, IterationSpacing, LoopOutcome, LoopSettings, Pacer, ShutdownSignal};
use crate::ui::{thousands, BannerInfo, RunDisplay};
use crate::workspace::{read_state, Workspace};

/// Run the loop for `task` until shutdown or the iteration cap.
pub async fn run_session(config: &RalphConfig, task: &str, shutdown: ShutdownSignal) -> Result<LoopOutcome> {
    let task = task.trim();
    if task.is_empty() {
        return Err(RalphError::EmptyTask);
    }

    config.workspace().ensure()?;
    let workspace = Workspace::new(std::fs::canonicalize(&config.workspace_dir)?);
    let budget = config.budget();

    let mut display = RunDisplay::new();
    display.banner(&BannerInfo {
        task,
        workspace: workspace.root(),
        max_iterations: config.iteration_cap(),
        model: &config.model,
        token_limit: budget.token_limit,
        cap: budget.cap(),
        window_seconds: budget.window_seconds,
    });

    let (state, created) = workspace.load_or_init(task)?;
    if created {
        display.note("Created initial state.md");
    } else {
        display.note(&format!("Resuming from iteration {}", state.iteration));
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let spacing = IterationSpacing::with_marker(config.min_iteration_interval_secs, workspace.spacing_marker());
    let mut pacer = Pacer::from_config(&budget, clock, config.tracker_path(), spacing);

    let inherited = pacer.stats().current_window_usage;
    if inherited > 0 {
        display.warn(&format!(
            "Found {} tokens used in the last {:.0}s from previous runs",
            thousands(inherited),
            budget.window_seconds
        ));
    }

    let executor = CommandExecutor::new(&config.agent_command, workspace.root(), &config.model);
    let settings = LoopSettings {
        task: task.to_string(),
        max_iterations: config.iteration_cap(),
        max_steps: config.max_steps,
    };
    let metrics = RunMetricsCollector::new(RunMetricsCollector::generate_run_id(), task);
    debug!(run_id = %metrics.run_id(), "starting run");

    let mut looper = IterationLoop::new(executor, pacer, workspace.clone(), settings)
        .with_retry(config.retry_policy())
        .with_shutdown(shutdown)
        .with_metrics(metrics);
    let outcome = looper.run(state.iteration, |event| display.handle(event)).await;

    match RunMetricsStore::new(workspace.root()).and_then(|store| store.save(&outcome.metrics)) {
        Ok(path) => debug!(path = %path.display(), "saved run metrics"),
        Err(err) => warn!(error = %err, "could not save run metrics"),
    }

    let files_created = read_state(workspace.root())
        .map(|state| state.files_created.len())
        .unwrap_or(0);
    display.summary(&outcome.stop, &outcome.metrics, workspace.root(), files_created);

    Ok(outcome)
}
