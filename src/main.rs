//! `ralph` command-line entry point.

use std::io::{self, BufRead};
use std::path::PathBuf;

use clap::Parser;
use tracing::debug;

use ralph_pacer::app::run_session;
use ralph_pacer::logging;
use ralph_pacer::pacing::ShutdownSignal;
use ralph_pacer::{ConfigOverrides, RalphConfig, RalphError};

#[derive(Parser, Debug)]
#[command(
    name = "ralph",
    version,
    about = "Run an agent in a loop, pacing iterations to stay under a token-per-minute budget"
)]
struct Cli {
    /// Task for the agent. Read from stdin when omitted.
    task: Vec<String>,

    /// Config file (defaults to ./ralph.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Workspace directory holding state.md and output/
    #[arg(short, long)]
    workspace: Option<PathBuf>,

    /// Last iteration to run (0 = unlimited)
    #[arg(short = 'n', long, allow_negative_numbers = true)]
    max_iterations: Option<i64>,

    /// Model name passed to the agent command
    #[arg(short, long)]
    model: Option<String>,

    /// Provider token limit per window
    #[arg(long)]
    token_limit: Option<u64>,

    /// Fraction of the token limit to use (0 < margin <= 1)
    #[arg(long)]
    safety_margin: Option<f64>,

    /// Shell command that runs one agent iteration
    #[arg(long)]
    agent_command: Option<String>,

    /// Keep the token window in memory only
    #[arg(long)]
    no_persist: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            workspace_dir: self.workspace.clone(),
            max_iterations: self.max_iterations,
            model: self.model.clone(),
            token_limit: self.token_limit,
            safety_margin: self.safety_margin,
            agent_command: self.agent_command.clone(),
            no_persist: self.no_persist,
            verbose: self.verbose,
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), RalphError> {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = RalphConfig::load(cli.config.as_deref(), &cli.overrides())?;
    logging::init(config.verbose);
    debug!(?config, "configuration loaded");

    let task = if cli.task.is_empty() {
        read_task_from_stdin()?
    } else {
        cli.task.join(" ")
    };
    if task.trim().is_empty() {
        return Err(RalphError::EmptyTask);
    }

    let shutdown = ShutdownSignal::new();
    let handle = shutdown.clone();
    let installed = ctrlc::set_handler(move || {
        eprintln!("\nShutdown requested. Finishing current iteration...");
        handle.request();
    });
    if let Err(err) = installed {
        tracing::warn!(error = %err, "could not install signal handler");
    }

    run_session(&config, &task, shutdown).await?;
    Ok(())
}

fn read_task_from_stdin() -> io::Result<String> {
    eprint!("Enter your task: ");
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
