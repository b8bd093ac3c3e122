//! Console output for a Ralph run.

use std::io::IsTerminal;
use std::path::Path;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::{OwoColorize, Style};

use crate::budget::{BudgetStatus, TrackerStats};
use crate::metrics::RunMetrics;
use crate::pacing::{LoopEvent, LoopStop};

/// Static facts shown in the start banner.
#[derive(Debug, Clone)]
pub struct BannerInfo<'a> {
    pub task: &'a str,
    pub workspace: &'a Path,
    pub max_iterations: u64,
    pub model: &'a str,
    pub token_limit: u64,
    pub cap: u64,
    pub window_seconds: f64,
}

/// Prints the banner, per-iteration progress and the final summary.
pub struct RunDisplay {
    use_colors: bool,
    spinner: Option<ProgressBar>,
}

impl Default for RunDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl RunDisplay {
    /// Colours and the spinner are enabled on a terminal unless `NO_COLOR` is set.
    pub fn new() -> Self {
        let interactive = std::io::stdout().is_terminal();
        Self {
            use_colors: interactive && std::env::var_os("NO_COLOR").is_none(),
            spinner: None,
        }
    }

    pub fn plain() -> Self {
        Self {
            use_colors: false,
            spinner: None,
        }
    }

    fn paint(&self, text: &str, style: Style) -> String {
        if self.use_colors {
            text.style(style).to_string()
        } else {
            text.to_string()
        }
    }

    pub fn banner(&self, info: &BannerInfo<'_>) {
        println!("{}", self.format_banner(info));
    }

    pub fn format_banner(&self, info: &BannerInfo<'_>) -> String {
        let max = if info.max_iterations == 0 {
            "Unlimited".to_string()
        } else {
            info.max_iterations.to_string()
        };
        let title = self.paint("Starting Ralph", Style::new().blue().bold());
        format!(
            "{title}\n  Task:           {}\n  Workspace:      {}\n  Max iterations: {max}\n  Model:          {}\n  Token budget:   {} per {:.0}s window (of {} declared)",
            info.task,
            info.workspace.display(),
            info.model,
            thousands(info.cap),
            info.window_seconds,
            thousands(info.token_limit),
        )
    }

    /// Note printed once before the first iteration.
    pub fn note(&self, message: &str) {
        println!("{}", self.paint(message, Style::new().cyan()));
    }

    pub fn warn(&self, message: &str) {
        println!("{}", self.paint(message, Style::new().yellow()));
    }

    /// Render one loop event.
    pub fn handle(&mut self, event: &LoopEvent) {
        match event {
            LoopEvent::WaitStarted { .. } => {
                let message = self.format_event(event);
                self.start_spinner(message);
            }
            LoopEvent::WaitFinished { .. } => self.finish_spinner(),
            _ => println!("{}", self.format_event(event)),
        }
    }

    pub fn format_event(&self, event: &LoopEvent) -> String {
        match event {
            LoopEvent::WaitStarted {
                wait_secs,
                window_usage,
                estimated_tokens,
                ..
            } => format!(
                "Rate limit protection: waiting {wait_secs:.1}s (window usage {}, next iteration ~{})",
                thousands(*window_usage),
                thousands(*estimated_tokens),
            ),
            LoopEvent::WaitFinished { iteration } => format!("Budget available for iteration {iteration}"),
            LoopEvent::IterationStarted {
                iteration,
                remaining_budget,
                cap,
            } => {
                let header = self.paint(&format!("━━ Iteration {iteration} ━━"), Style::new().cyan().bold());
                let budget = self.paint(
                    &format!("budget {} / {} available", thousands(*remaining_budget), thousands(*cap)),
                    Style::new().dimmed(),
                );
                format!("\n{header} {budget}")
            }
            LoopEvent::StateRecreated { .. } => {
                self.paint("Created initial state.md for the agent to read", Style::new().dimmed())
            }
            LoopEvent::IterationCompleted {
                iteration,
                tokens,
                partial,
                stats,
            } => {
                let headline = if *partial {
                    self.paint(
                        &format!("~ Iteration {iteration} ended early (partial result)"),
                        Style::new().yellow(),
                    )
                } else {
                    self.paint(&format!("✓ Iteration {iteration} completed"), Style::new().green())
                };
                let used = match tokens {
                    Some(tokens) => thousands(*tokens),
                    None => "unknown (agent reported no usage)".to_string(),
                };
                format!(
                    "{headline}\n{}\n{}",
                    self.paint(&format!("Tokens this iteration: {used}"), Style::new().cyan()),
                    self.format_stats(stats),
                )
            }
            LoopEvent::IterationFailed { iteration, error } => format!(
                "{}\n{}",
                self.paint(&format!("✗ Error in iteration {iteration}: {error}"), Style::new().red()),
                self.paint("Continuing to next iteration...", Style::new().yellow()),
            ),
        }
    }

    pub fn format_stats(&self, stats: &TrackerStats) -> String {
        let status = stats.status();
        let style = match status {
            BudgetStatus::Ok => Style::new().dimmed(),
            BudgetStatus::Warning => Style::new().yellow(),
            BudgetStatus::Critical | BudgetStatus::Exceeded => Style::new().red(),
        };
        self.paint(
            &format!(
                "Total tokens: {} | Window usage: {}/{} ({:.1}%) [{}]",
                thousands(stats.total_tokens),
                thousands(stats.current_window_usage),
                thousands(stats.limit),
                stats.utilization_pct,
                status.label(),
            ),
            style,
        )
    }

    pub fn summary(&self, stop: &LoopStop, metrics: &RunMetrics, workspace: &Path, files_created: usize) {
        println!("{}", self.format_summary(stop, metrics, workspace, files_created));
    }

    pub fn format_summary(
        &self,
        stop: &LoopStop,
        metrics: &RunMetrics,
        workspace: &Path,
        files_created: usize,
    ) -> String {
        let reason = match stop {
            LoopStop::Shutdown => "shutdown requested".to_string(),
            LoopStop::MaxIterations { max_iterations, .. } => {
                format!("reached maximum iterations ({max_iterations})")
            }
        };
        format!(
            "\n{}\n  Completed iterations: {}\n  Failed iterations:    {}\n  Workspace:            {}\n  Files created:        {}\n  Total tokens:         {}\n  Time waiting:         {:.1}s\n  Stopped:              {reason}",
            self.paint("Ralph Session Complete", Style::new().green().bold()),
            metrics.iterations_completed,
            metrics.failures,
            workspace.display(),
            files_created,
            thousands(metrics.total_tokens),
            metrics.total_wait.as_secs_f64(),
        )
    }

    fn start_spinner(&mut self, message: String) {
        self.finish_spinner();
        if !self.use_colors {
            println!("{message}");
            return;
        }
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.yellow} {msg} [{elapsed}]") {
            spinner.set_style(style);
        }
        spinner.set_message(message);
        spinner.enable_steady_tick(Duration::from_millis(120));
        self.spinner = Some(spinner);
    }

    fn finish_spinner(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }
}

/// `1234567` -> `1,234,567`.
pub fn thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
