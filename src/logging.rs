//! Logging setup for the provider process.
//!
//! All events go to **stderr**; stdout belongs to the orchestrator.
//! Filtering follows `RUST_LOG`, for example:
//!
//! ```bash
//! # Log every request the client sends and every reconcile step
//! RUST_LOG=fastly_provider=debug ./provider
//! ```

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Level used when `RUST_LOG` is unset.
pub const DEFAULT_LEVEL: &str = "info";

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn try_install(default_level: &str) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false),
        )
        .try_init()
}

/// Install the stderr subscriber at [`DEFAULT_LEVEL`].
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    init_logging_with_default(DEFAULT_LEVEL);
}

/// Like [`init_logging`], with a caller-chosen level for when `RUST_LOG` is unset.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging_with_default(default_level: &str) {
    try_install(default_level).expect("a global tracing subscriber is already installed");
}

/// Install the subscriber unless one is already set.
///
/// Returns `false` when a subscriber was already present. Safe to call from
/// several tests in the same process.
pub fn try_init_logging() -> bool {
    try_install(DEFAULT_LEVEL).is_ok()
}
