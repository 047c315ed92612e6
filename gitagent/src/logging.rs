//! Diagnostic tracing for the agent.
//!
//! Diagnostics go to stderr and are controlled by `RUST_LOG`. Stdout carries
//! only user-facing progress and the final response; session records are the
//! durable product output.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the tracing subscriber.
///
/// Reads `RUST_LOG`; defaults to `warn`. Compact format on stderr.
///
/// # Example
/// ```bash
/// RUST_LOG=gitagent=debug gitagent "stage and commit my changes"
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
