//! Diagnostic tracing.
//!
//! Tracing output goes to stderr and is meant for debugging the pacer itself.
//! What the user watches during a run (banner, iteration headers, wait
//! spinner) is printed by [`crate::ui`] and is not affected by `RUST_LOG`.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins when set. Otherwise only warnings are shown, or debug
/// output from this crate with `verbose`.
pub fn init(verbose: bool) {
    let default = if verbose { "warn,ralph_pacer=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
