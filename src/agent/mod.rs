//! Agent execution seam.
//!
//! The loop treats an agent run as an opaque awaitable: it hands over a prompt
//! and a step limit and gets back whatever usage the agent reported. Every
//! run starts from a fresh context; cross-iteration memory lives in the
//! workspace files.

mod command;
mod prompt;

use async_trait::async_trait;
use thiserror::Error;

pub use command::{is_rate_limit_message, CommandExecutor};
pub use prompt::{iteration_prompt, SYSTEM_PROMPT};

/// One unit of work for the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    /// Iteration number this unit belongs to
    pub iteration: u64,
    /// Full prompt handed to the agent
    pub prompt: String,
    /// Maximum internal steps (model calls) the agent may take
    pub max_steps: u32,
}

/// Outcome of an agent run that produced a result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentRun {
    /// Whether the agent finished normally (false for a partial result)
    pub completed: bool,
    /// Tokens the agent reported, when it reported any
    pub total_tokens: Option<u64>,
    /// Captured output
    pub output: String,
}

/// Errors from an agent run.
#[derive(Error, Debug)]
pub enum AgentError {
    /// The provider rejected the run for exceeding its rate limit.
    #[error("rate limited by provider: {0}")]
    RateLimited(String),

    /// The agent exited unsuccessfully.
    #[error("agent failed (exit code {code:?}): {message}")]
    Failed { code: Option<i32>, message: String },

    /// The agent process could not be started or driven.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Shutdown was requested while waiting to retry.
    #[error("interrupted by shutdown request")]
    Interrupted,
}

impl AgentError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, AgentError::RateLimited(_))
    }
}

/// Runs one unit of work.
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    async fn execute(&self, unit: &WorkUnit) -> Result<AgentRun, AgentError>;
}

#[async_trait]
impl<T: AgentExecutor + ?Sized> AgentExecutor for &T {
    async fn execute(&self, unit: &WorkUnit) -> Result<AgentRun, AgentError> {
        (**self).execute(unit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_classification() {
        assert!(AgentError::RateLimited("429".into()).is_rate_limited());
        assert!(!AgentError::Interrupted.is_rate_limited());
        assert!(!AgentError::Failed {
            code: Some(1),
            message: "boom".into()
        }
        .is_rate_limited());
    }

    #[test]
    fn test_error_display() {
        let err = AgentError::Failed {
            code: Some(2),
            message: "bad flag".into(),
        };
        assert_eq!(err.to_string(), "agent failed (exit code Some(2)): bad flag");
    }
}
