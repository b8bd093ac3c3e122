//! Iteration pacing.
//!
//! Every iteration moves through the same phases:
//!
//! ```text
//! Idle -> Estimating -> [Waiting] -> Executing -> Recording -> Idle
//!   \-> Done (shutdown requested or iteration cap reached)
//! ```
//!
//! The pacing wait is the only suspension caused by the token budget. Rate
//! limits the provider still reports are handled separately by
//! [`RetryPolicy`].

mod pacer;
mod retry;
mod runner;
mod shutdown;
mod spacing;

pub use pacer::{Pacer, PacingDecision};
pub use retry::{Attempted, RetryPolicy, DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_INITIAL_DELAY};
pub use runner::{IterationLoop, LoopEvent, LoopOutcome, LoopSettings, LoopStop, PacingPhase};
pub use shutdown::ShutdownSignal;
pub use spacing::IterationSpacing;
