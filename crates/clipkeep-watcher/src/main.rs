//! Binary entrypoint for the clipboard watcher worker.

use std::io::{self, Write};
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use clipkeep_watcher::{CommandBackend, DEFAULT_POLL_INTERVAL, Tool, run, telemetry};
use tracing::{error, info};

const LOG_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::main");

/// Watches the desktop clipboard and reports changes to clipkeepd over the
/// snapshot channel on stdin/stdout.
#[derive(Parser, Debug)]
#[command(name = "clipkeep-watch", version)]
struct WatchArgs {
    /// Clipboard tools to drive; detected from the session when omitted.
    #[arg(long, value_enum)]
    tool: Option<Tool>,
    /// Milliseconds between two polls.
    #[arg(long, value_name = "MS")]
    interval_ms: Option<u64>,
    /// Log filter used when `CLIPKEEP_WATCH_LOG` is unset.
    #[arg(long, default_value = "info")]
    log_filter: String,
}

fn main() -> ExitCode {
    let args = WatchArgs::parse();
    if let Err(error) = telemetry::initialise(&args.log_filter) {
        let _ignored = writeln!(io::stderr(), "clipkeep-watch: {error}");
    }

    let tool = args.tool.unwrap_or_else(Tool::detect);
    let interval = args
        .interval_ms
        .map_or(DEFAULT_POLL_INTERVAL, Duration::from_millis);
    info!(target: LOG_TARGET, %tool, interval_ms = interval.as_millis(), "watcher starting");

    match run(io::stdin(), io::stdout().lock(), CommandBackend::new(tool), interval) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!(target: LOG_TARGET, %error, "watcher stopped");
            ExitCode::FAILURE
        }
    }
}
