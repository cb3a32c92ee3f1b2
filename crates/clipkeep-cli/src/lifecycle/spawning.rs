//! Server process spawning.
//!
//! Resolves the `clipkeepd` binary and launches it with the configuration
//! flags the client was given.

use std::env;
use std::ffi::{OsStr, OsString};
use std::process::{Child, Command, Stdio};

use super::error::LifecycleError;

const DAEMON_BIN_ENV: &str = "CLIPKEEPD_BIN";
const DEFAULT_DAEMON_BIN: &str = "clipkeepd";

/// Spawns the server with the given configuration arguments.
///
/// Uses the binary override if provided, otherwise falls back to the
/// `CLIPKEEPD_BIN` environment variable or `clipkeepd` on the `PATH`.
pub(super) fn spawn_daemon(
    config_arguments: &[OsString],
    binary_override: Option<&OsStr>,
) -> Result<Child, LifecycleError> {
    let binary = resolve_daemon_binary(binary_override);
    let mut command = Command::new(&binary);
    // argv[0] is the client itself.
    command.args(config_arguments.iter().skip(1));
    command
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    command
        .spawn()
        .map_err(|source| LifecycleError::LaunchDaemon { binary, source })
}

fn resolve_daemon_binary(binary_override: Option<&OsStr>) -> OsString {
    binary_override
        .map(OsString::from)
        .or_else(|| env::var_os(DAEMON_BIN_ENV))
        .unwrap_or_else(|| OsString::from(DEFAULT_DAEMON_BIN))
}
