//! Ralph: an autonomous agent loop paced by a rolling-window token budget.
//!
//! Each iteration hands a fresh, stateless agent the task plus a pointer to
//! `state.md`, the only memory carried between iterations. Before every
//! iteration the [`pacing`] layer asks the [`budget`] tracker how long to wait
//! so the run stays under the provider's per-minute token quota, even across
//! process restarts.

pub mod agent;
pub mod app;
pub mod budget;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pacing;
pub mod ui;
pub mod workspace;

pub use config::{ConfigError, ConfigOverrides, RalphConfig};
pub use error::{RalphError, Result};
