//! Top-level error type.

use thiserror::Error;

use crate::config::ConfigError;
use crate::workspace::StateError;

/// Errors that stop a Ralph run.
///
/// Most failures inside the loop are recovered where they happen; only these
/// reach the binary.
#[derive(Error, Debug)]
pub enum RalphError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("workspace state error: {0}")]
    State(#[from] StateError),

    #[error("task cannot be empty")]
    EmptyTask,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RalphError>;
