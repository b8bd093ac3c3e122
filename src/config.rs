//! Ralph configuration.
//!
//! Sources, lowest precedence first:
//!
//! 1. built-in defaults
//! 2. `ralph.toml` in the current directory, or the file passed with `--config`
//! 3. `RALPH_*` environment variables (`RALPH_TOKEN_LIMIT=30000`)
//! 4. command-line flags

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::budget::{WindowBudgetConfig, DEFAULT_TOKEN_LIMIT};
use crate::pacing::{RetryPolicy, DEFAULT_RETRY_ATTEMPTS};
use crate::workspace::Workspace;

/// Config file looked up in the current directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "ralph.toml";

/// Prefix of configuration environment variables.
pub const ENV_PREFIX: &str = "RALPH";

pub const DEFAULT_AGENT_COMMAND: &str = "claude -p --output-format json --max-turns {max_steps}";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Values taken from command-line flags. `None` leaves the lower layers alone.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub workspace_dir: Option<PathBuf>,
    pub max_iterations: Option<i64>,
    pub model: Option<String>,
    pub token_limit: Option<u64>,
    pub safety_margin: Option<f64>,
    pub agent_command: Option<String>,
    pub no_persist: bool,
    pub verbose: bool,
}

/// Complete runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RalphConfig {
    /// Model name handed to the agent command
    pub model: String,
    /// Directory holding `state.md` and the agent's output
    #[serde(alias = "workspace")]
    pub workspace_dir: PathBuf,
    /// Last iteration number to run (0 = unlimited)
    pub max_iterations: i64,
    /// Step limit for a single agent run
    pub max_steps: u32,

    /// Provider limit per window (tokens)
    pub token_limit: u64,
    pub safety_margin: f64,
    pub window_seconds: f64,
    pub wait_buffer_seconds: f64,
    pub base_overhead_tokens: u64,
    pub tokens_per_tool_call: u64,
    pub expected_tool_calls: u64,

    /// Keep the token window in a snapshot file across restarts
    pub persist_tracker: bool,
    /// Snapshot location (default `<workspace>/.ralph_tokens.json`)
    pub tracker_file: Option<PathBuf>,
    /// Minimum seconds between iteration starts (0 = disabled)
    pub min_iteration_interval_secs: f64,

    pub retry_attempts: u32,
    pub retry_initial_delay_secs: f64,

    /// Shell command that runs one agent iteration
    pub agent_command: String,
    pub verbose: bool,
}

impl Default for RalphConfig {
    fn default() -> Self {
        let budget = WindowBudgetConfig::default();
        Self {
            model: "gpt-4o-mini".to_string(),
            workspace_dir: PathBuf::from("workspace"),
            max_iterations: 0,
            max_steps: 80,
            token_limit: DEFAULT_TOKEN_LIMIT,
            safety_margin: budget.safety_margin,
            window_seconds: budget.window_seconds,
            wait_buffer_seconds: budget.wait_buffer_seconds,
            base_overhead_tokens: budget.base_overhead_tokens,
            tokens_per_tool_call: budget.tokens_per_tool_call,
            expected_tool_calls: budget.expected_tool_calls,
            persist_tracker: true,
            tracker_file: None,
            min_iteration_interval_secs: 0.0,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_initial_delay_secs: 1.0,
            agent_command: DEFAULT_AGENT_COMMAND.to_string(),
            verbose: false,
        }
    }
}

impl RalphConfig {
    /// Load configuration from every source and validate it.
    pub fn load(config_file: Option<&Path>, overrides: &ConfigOverrides) -> ConfigResult<Self> {
        let env = Environment::with_prefix(ENV_PREFIX).try_parsing(true);
        Self::load_with_env(config_file, env, overrides)
    }

    fn load_with_env(
        config_file: Option<&Path>,
        env: Environment,
        overrides: &ConfigOverrides,
    ) -> ConfigResult<Self> {
        let file = match config_file {
            Some(path) => File::from(path).format(FileFormat::Toml).required(true),
            None => File::new(DEFAULT_CONFIG_FILE, FileFormat::Toml).required(false),
        };

        let settings = Config::builder().add_source(file).add_source(env).build()?;
        let mut config: RalphConfig = settings.try_deserialize()?;
        config.apply_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    /// Apply command-line values on top of the loaded configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(dir) = &overrides.workspace_dir {
            self.workspace_dir = dir.clone();
        }
        if let Some(max) = overrides.max_iterations {
            self.max_iterations = max;
        }
        if let Some(model) = &overrides.model {
            self.model = model.clone();
        }
        if let Some(limit) = overrides.token_limit {
            self.token_limit = limit;
        }
        if let Some(margin) = overrides.safety_margin {
            self.safety_margin = margin;
        }
        if let Some(command) = &overrides.agent_command {
            self.agent_command = command.clone();
        }
        if overrides.no_persist {
            self.persist_tracker = false;
        }
        if overrides.verbose {
            self.verbose = true;
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_iterations < 0 {
            return Err(ConfigError::Invalid(format!(
                "max_iterations must be >= 0 (0 = unlimited), got {}",
                self.max_iterations
            )));
        }
        if self.max_steps == 0 {
            return Err(ConfigError::Invalid("max_steps must be positive".to_string()));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::Invalid("model must not be empty".to_string()));
        }
        if self.agent_command.trim().is_empty() {
            return Err(ConfigError::Invalid("agent_command must not be empty".to_string()));
        }
        if self.retry_attempts == 0 {
            return Err(ConfigError::Invalid("retry_attempts must be at least 1".to_string()));
        }
        if !(self.retry_initial_delay_secs.is_finite() && self.retry_initial_delay_secs >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "retry_initial_delay_secs must be >= 0, got {}",
                self.retry_initial_delay_secs
            )));
        }
        if !(self.min_iteration_interval_secs.is_finite() && self.min_iteration_interval_secs >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "min_iteration_interval_secs must be >= 0, got {}",
                self.min_iteration_interval_secs
            )));
        }
        self.budget().validate().map_err(ConfigError::Invalid)
    }

    /// Settings for the token window.
    pub fn budget(&self) -> WindowBudgetConfig {
        WindowBudgetConfig {
            token_limit: self.token_limit,
            safety_margin: self.safety_margin,
            window_seconds: self.window_seconds,
            wait_buffer_seconds: self.wait_buffer_seconds,
            base_overhead_tokens: self.base_overhead_tokens,
            tokens_per_tool_call: self.tokens_per_tool_call,
            expected_tool_calls: self.expected_tool_calls,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let delay = Duration::try_from_secs_f64(self.retry_initial_delay_secs).unwrap_or(Duration::ZERO);
        RetryPolicy::new(self.retry_attempts, delay)
    }

    pub fn workspace(&self) -> Workspace {
        Workspace::new(&self.workspace_dir)
    }

    /// Snapshot path, or `None` when persistence is off.
    pub fn tracker_path(&self) -> Option<PathBuf> {
        if !self.persist_tracker {
            return None;
        }
        Some(
            self.tracker_file
                .clone()
                .unwrap_or_else(|| self.workspace().tracker_file()),
        )
    }

    /// Iteration cap as the loop uses it. Only meaningful after [`validate`](Self::validate).
    pub fn iteration_cap(&self) -> u64 {
        u64::try_from(self.max_iterations).unwrap_or(0)
    }
}
