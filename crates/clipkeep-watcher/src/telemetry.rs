//! Logging setup for the watcher process.
//!
//! The server inherits the watcher's stderr, so compact lines are written
//! there. The filter comes from `CLIPKEEP_WATCH_LOG`, falling back to the
//! value passed by the caller.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::{EnvFilter, fmt};

/// Environment variable holding the log filter.
pub const LOG_FILTER_ENV: &str = "CLIPKEEP_WATCH_LOG";

static TELEMETRY_GUARD: OnceCell<()> = OnceCell::new();

/// Errors encountered while configuring logging.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The filter expression does not parse.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// Another subscriber is already installed.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Installs the global subscriber once; later calls are no-ops.
///
/// # Errors
///
/// Fails when the filter does not parse or another subscriber is already
/// installed.
pub fn initialise(default_filter: &str) -> Result<(), TelemetryError> {
    TELEMETRY_GUARD
        .get_or_try_init(|| install_subscriber(default_filter))
        .map(|_| ())
}

fn install_subscriber(default_filter: &str) -> Result<(), TelemetryError> {
    let directive = std::env::var(LOG_FILTER_ENV).unwrap_or_else(|_| default_filter.to_owned());
    let filter =
        EnvFilter::try_new(&directive).map_err(|error| TelemetryError::Filter(error.to_string()))?;
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)
}
