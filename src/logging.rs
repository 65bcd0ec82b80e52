//! Subscriber setup
//!
//! Library code only emits `tracing` events. Binaries (and tests that want
//! to see the events) call [`init`] once at startup.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the filter directives, e.g. `debug` or
/// `tailbuf=trace`
pub const LOG_ENV: &str = "TAILBUF_LOG";

const DEFAULT_DIRECTIVE: &str = "info";

fn filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// Installs a JSON subscriber writing to stdout.
///
/// Returns `false` if a global subscriber was already installed, in which
/// case the existing one stays in place.
pub fn init() -> bool {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter())
        .with_current_span(true)
        .try_init()
        .is_ok()
}

/// Human-readable variant writing to stderr, used when stdout carries data
pub fn init_stderr() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
