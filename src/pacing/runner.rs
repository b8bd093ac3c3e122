//! The paced iteration loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, warn};

use super::{Pacer, RetryPolicy, ShutdownSignal};
use crate::agent::{iteration_prompt, AgentError, AgentExecutor, WorkUnit};
use crate::budget::{Clock, TrackerStats};
use crate::metrics::{IterationMetrics, RunMetrics, RunMetricsCollector};
use crate::workspace::{read_state, write_state, Workspace, WorkspaceState};

/// Where the loop currently is within one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacingPhase {
    Idle,
    Estimating,
    Waiting,
    Executing,
    Recording,
    Done,
}

/// Fixed inputs of one loop invocation.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub task: String,
    /// Last iteration number to run; 0 means unlimited
    pub max_iterations: u64,
    /// Step limit handed to the agent
    pub max_steps: u32,
}

/// Progress notifications, in the order they happen within an iteration.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopEvent {
    WaitStarted {
        iteration: u64,
        wait_secs: f64,
        window_usage: u64,
        estimated_tokens: u64,
    },
    WaitFinished {
        iteration: u64,
    },
    IterationStarted {
        iteration: u64,
        remaining_budget: u64,
        cap: u64,
    },
    StateRecreated {
        iteration: u64,
    },
    IterationCompleted {
        iteration: u64,
        tokens: Option<u64>,
        partial: bool,
        stats: TrackerStats,
    },
    IterationFailed {
        iteration: u64,
        error: String,
    },
}

/// Reason why the loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStop {
    /// Shutdown was requested.
    Shutdown,
    /// The next iteration would exceed the configured maximum.
    MaxIterations { next_iteration: u64, max_iterations: u64 },
}

/// Summary of a loop invocation.
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    pub started_at_iteration: u64,
    pub next_iteration: u64,
    pub iterations_run: u64,
    pub stop: LoopStop,
    pub metrics: RunMetrics,
}

/// Drives iterations until shutdown or the iteration cap.
///
/// Each iteration: estimate its cost, wait for budget if needed, run the
/// agent (retrying provider rate limits), then record actual usage. Agent
/// failures are logged and the loop moves on to the next iteration.
pub struct IterationLoop<E> {
    executor: E,
    pacer: Pacer,
    retry: RetryPolicy,
    shutdown: ShutdownSignal,
    workspace: Workspace,
    settings: LoopSettings,
    metrics: RunMetricsCollector,
    clock: Arc<dyn Clock>,
    phase: PacingPhase,
}

impl<E: AgentExecutor> IterationLoop<E> {
    pub fn new(executor: E, pacer: Pacer, workspace: Workspace, settings: LoopSettings) -> Self {
        let clock = pacer.clock();
        let metrics = RunMetricsCollector::new(RunMetricsCollector::generate_run_id(), &settings.task);
        Self {
            executor,
            pacer,
            retry: RetryPolicy::default(),
            shutdown: ShutdownSignal::new(),
            workspace,
            settings,
            metrics,
            clock,
            phase: PacingPhase::Idle,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn with_metrics(mut self, metrics: RunMetricsCollector) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn phase(&self) -> PacingPhase {
        self.phase
    }

    pub fn pacer_mut(&mut self) -> &mut Pacer {
        &mut self.pacer
    }

    /// Run iterations starting at `start_iteration`.
    pub async fn run<F: FnMut(&LoopEvent)>(&mut self, start_iteration: u64, mut on_event: F) -> LoopOutcome {
        let mut iteration = start_iteration;
        let mut iterations_run = 0u64;

        let stop = loop {
            self.phase = PacingPhase::Idle;
            if self.shutdown.is_requested() {
                break LoopStop::Shutdown;
            }
            let max = self.settings.max_iterations;
            if max > 0 && iteration > max {
                break LoopStop::MaxIterations {
                    next_iteration: iteration,
                    max_iterations: max,
                };
            }

            self.phase = PacingPhase::Estimating;
            let decision = self.pacer.plan();
            let mut waited = Duration::ZERO;
            if decision.must_wait() {
                self.phase = PacingPhase::Waiting;
                let wait_secs = decision.wait_secs();
                info!(iteration, wait_secs, usage = decision.window_usage, "waiting for token budget");
                on_event(&LoopEvent::WaitStarted {
                    iteration,
                    wait_secs,
                    window_usage: decision.window_usage,
                    estimated_tokens: decision.estimated_tokens,
                });

                let wait = Duration::try_from_secs_f64(wait_secs).unwrap_or(Duration::MAX);
                let wait_began = self.clock.now();
                tokio::select! {
                    _ = self.clock.sleep(wait) => {}
                    _ = self.shutdown.cancelled() => {}
                }
                waited = Duration::try_from_secs_f64((self.clock.now() - wait_began).max(0.0))
                    .unwrap_or(Duration::ZERO);
                on_event(&LoopEvent::WaitFinished { iteration });

                if self.shutdown.is_requested() {
                    break LoopStop::Shutdown;
                }
            }

            self.pacer.mark_iteration_start();
            on_event(&LoopEvent::IterationStarted {
                iteration,
                remaining_budget: self.pacer.remaining_budget(),
                cap: self.pacer.tracker().cap(),
            });
            self.ensure_state(iteration, &mut on_event);

            self.phase = PacingPhase::Executing;
            let unit = WorkUnit {
                iteration,
                prompt: iteration_prompt(iteration, &self.settings.task, self.settings.max_steps),
                max_steps: self.settings.max_steps,
            };
            let started = Instant::now();
            let executor = &self.executor;
            let unit_ref = &unit;
            let attempted = self
                .retry
                .run(self.clock.as_ref(), &self.shutdown, move || executor.execute(unit_ref))
                .await;

            let mut record = IterationMetrics {
                wait: waited,
                duration: started.elapsed(),
                attempts: attempted.attempts,
                ..IterationMetrics::new(iteration)
            };

            match attempted.result {
                Ok(run) => {
                    self.phase = PacingPhase::Recording;
                    self.pacer.record(run.total_tokens);
                    let stats = self.pacer.stats();
                    info!(
                        iteration,
                        tokens = run.total_tokens.unwrap_or(0),
                        window_usage = stats.current_window_usage,
                        "iteration completed"
                    );
                    record.tokens = run.total_tokens.unwrap_or(0);
                    record.success = run.completed;
                    on_event(&LoopEvent::IterationCompleted {
                        iteration,
                        tokens: run.total_tokens,
                        partial: !run.completed,
                        stats,
                    });
                }
                Err(AgentError::Interrupted) => {
                    debug!(iteration, "shutdown during retry backoff");
                    break LoopStop::Shutdown;
                }
                Err(err) => {
                    warn!(iteration, error = %err, "iteration failed, continuing");
                    record.error = Some(err.to_string());
                    on_event(&LoopEvent::IterationFailed {
                        iteration,
                        error: err.to_string(),
                    });
                }
            }

            record.completed_at = Utc::now();
            self.metrics.record_iteration(record);
            iteration += 1;
            iterations_run += 1;
        };

        self.phase = PacingPhase::Done;
        LoopOutcome {
            started_at_iteration: start_iteration,
            next_iteration: iteration,
            iterations_run,
            stop,
            metrics: self.metrics.finish(),
        }
    }

    /// Recreate `state.md` if the agent deleted or mangled it.
    fn ensure_state<F: FnMut(&LoopEvent)>(&self, iteration: u64, on_event: &mut F) {
        if read_state(self.workspace.root()).is_some() {
            return;
        }
        let mut state = WorkspaceState::create_initial(&self.settings.task);
        state.iteration = iteration;
        match write_state(self.workspace.root(), &mut state) {
            Ok(()) => on_event(&LoopEvent::StateRecreated { iteration }),
            Err(err) => warn!(error = %err, "could not recreate state.md"),
        }
    }
}
