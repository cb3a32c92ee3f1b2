//! Process lifecycle: singleton guard, daemonisation, signals and the launch
//! sequence tying the server together.

use std::time::Duration;

pub(crate) mod daemonizer;
mod errors;
mod guard;
pub(crate) mod launch;
pub(crate) mod shutdown;

pub use errors::{ALREADY_RUNNING_STATUS, GuardError, LaunchError};
pub use launch::{LaunchMode, run_daemon};

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");
pub(crate) const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);
pub(crate) const FOREGROUND_ENV_VAR: &str = "CLIPKEEP_FOREGROUND";
