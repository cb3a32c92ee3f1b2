//! Launch failures and the exit status each one maps to.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTimeError;

use nix::errno::Errno;
use thiserror::Error;

use ortho_config::OrthoError;

use clipkeep_config::{RuntimePathsError, SocketPreparationError};

use crate::bootstrap::BootstrapError;
use crate::transport::ListenerError;

use super::daemonizer::DaemonizeError;
use super::shutdown::ShutdownError;

/// Exit status when another server already owns the runtime files or the
/// socket.
pub const ALREADY_RUNNING_STATUS: u8 = 3;

/// Failures handling the lock, pid and health files.
#[derive(Debug, Error)]
pub enum GuardError {
    /// The lock is held by a live process.
    #[error("clipkeepd is already running with pid {pid}")]
    AlreadyRunning { pid: u32 },
    #[error("cannot create lock file {}: {source}", path.display())]
    LockCreate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// A file left by a dead server could not be removed.
    #[error("cannot remove stale file {}: {source}", path.display())]
    Cleanup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot tell whether pid {pid} is alive: {source}")]
    CheckProcess {
        pid: u32,
        #[source]
        source: Errno,
    },
    #[error("cannot write pid file {}: {source}", path.display())]
    PidWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Health was reported before the pid file existed.
    #[error("pid must be written before updating health state")]
    MissingPid,
    #[error("cannot write health file {}: {source}", path.display())]
    HealthWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot encode health snapshot: {0}")]
    HealthEncode(#[from] serde_json::Error),
    #[error("system clock is before the unix epoch: {0}")]
    Clock(#[from] SystemTimeError),
}

/// Errors surfaced while launching or supervising the server process.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] Arc<OrthoError>),
    #[error("failed to prepare server socket: {0}")]
    Socket(#[from] SocketPreparationError),
    #[error("failed to prepare runtime directory: {0}")]
    Runtime(#[from] RuntimePathsError),
    #[error(transparent)]
    Guard(#[from] GuardError),
    /// A live server answers on the configured Unix socket.
    #[error("another server is listening on {path}")]
    SocketInUse { path: String },
    #[error("failed to daemonise: {0}")]
    Daemonize(#[from] DaemonizeError),
    #[error("failed to await shutdown signal: {0}")]
    Shutdown(#[from] ShutdownError),
    #[error("server bootstrap failed: {0}")]
    Bootstrap(#[from] BootstrapError),
    #[error("server socket listener failed: {0}")]
    Listener(ListenerError),
}

impl LaunchError {
    /// Whether this launch lost to a server that is already running.
    #[must_use]
    pub const fn already_running(&self) -> bool {
        matches!(
            self,
            Self::Guard(GuardError::AlreadyRunning { .. }) | Self::SocketInUse { .. }
        )
    }

    /// Process exit status for this failure.
    #[must_use]
    pub const fn exit_status(&self) -> u8 {
        if self.already_running() {
            ALREADY_RUNNING_STATUS
        } else {
            1
        }
    }
}

impl From<ListenerError> for LaunchError {
    fn from(source: ListenerError) -> Self {
        match source {
            #[cfg(unix)]
            ListenerError::UnixInUse { path } => Self::SocketInUse { path },
            other => Self::Listener(other),
        }
    }
}
