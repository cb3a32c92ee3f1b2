//! Failures of `clipkeep daemon start|stop|status`.

use std::ffi::OsString;
use std::io;
use std::num::ParseIntError;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use clipkeep_config::{RuntimePathsError, SocketPreparationError};
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum LifecycleError {
    #[error(
        "server socket {endpoint} is already in use; stop the running server with 'clipkeep daemon stop' or change --daemon-socket"
    )]
    SocketInUse { endpoint: String },
    #[error("cannot tell whether a server listens on {endpoint}: {source}")]
    SocketCheck {
        endpoint: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to spawn clipkeepd binary '{binary:?}': {source}")]
    LaunchDaemon {
        binary: OsString,
        #[source]
        source: io::Error,
    },
    #[error("clipkeepd exited before reporting ready (status: {exit_status:?})")]
    StartupFailed { exit_status: Option<i32> },
    #[error("clipkeepd stopped before reaching ready; see {}", path.display())]
    StartupAborted { path: PathBuf },
    #[error("clipkeepd was not ready after {timeout_ms} ms; see {}", health_path.display())]
    StartupTimeout {
        health_path: PathBuf,
        timeout_ms: u128,
    },
    #[error("failed to watch the spawned server: {source}")]
    MonitorChild {
        #[source]
        source: io::Error,
    },
    /// The health snapshot or pid file exists but cannot be used.
    #[error("unusable runtime file {}: {fault}", path.display())]
    RuntimeFile {
        path: PathBuf,
        #[source]
        fault: RuntimeFileFault,
    },
    #[error(
        "server socket {endpoint} answers but pid file {} is missing; inspect the runtime directory before retrying",
        path.display()
    )]
    MissingPidWithSocket { path: PathBuf, endpoint: String },
    #[error("failed to write lifecycle output: {0}")]
    Io(#[source] io::Error),
    #[error("failed to signal clipkeepd pid {pid}: {source}")]
    SignalFailed {
        pid: u32,
        #[source]
        source: io::Error,
    },
    #[error("clipkeepd did not stop within {timeout:?}; check {}", pid_path.display())]
    ShutdownTimeout { pid_path: PathBuf, timeout: Duration },
    #[error("system clock reads {time:?}, before the Unix epoch")]
    InvalidSystemClock { time: SystemTime },
    #[cfg(not(unix))]
    #[error("platform does not support server lifecycle signalling")]
    UnsupportedPlatform,
    #[error(transparent)]
    Paths(#[from] RuntimePathsError),
    #[error("failed to prepare server socket: {0}")]
    Socket(#[from] SocketPreparationError),
}

impl LifecycleError {
    pub(super) fn runtime_file(path: &Path, fault: impl Into<RuntimeFileFault>) -> Self {
        Self::RuntimeFile {
            path: path.to_path_buf(),
            fault: fault.into(),
        }
    }
}

/// What is wrong with a runtime file.
#[derive(Debug, Error)]
pub(crate) enum RuntimeFileFault {
    #[error("cannot read it: {0}")]
    Read(#[from] io::Error),
    #[error("not a health snapshot: {0}")]
    Health(#[from] serde_json::Error),
    #[error("not a pid: {0}")]
    Pid(#[from] ParseIntError),
}
