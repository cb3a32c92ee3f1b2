//! Detaches `clipkeepd` from the controlling terminal.
//!
//! The detached server keeps its logs: stderr is appended to
//! `clipkeepd.log` in the runtime directory.

use std::ffi::OsStr;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use daemonize_me::Daemon;
use thiserror::Error;
use tracing::info;

use super::PROCESS_TARGET;
use clipkeep_config::RuntimePaths;

/// Puts the server into the background.
pub trait Daemonizer: Send + Sync {
    /// Returns in the detached child only.
    fn daemonize(&self, paths: &RuntimePaths) -> Result<(), DaemonizeError>;
}

#[derive(Debug, Error)]
pub enum DaemonizeError {
    #[error("cannot open log file {}: {source}", path.display())]
    LogFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{0}")]
    System(#[from] daemonize_me::DaemonError),
}

/// `daemonize-me` backed detach. The working directory becomes the runtime
/// directory.
#[derive(Debug, Default)]
pub struct SystemDaemonizer;

impl SystemDaemonizer {
    pub fn new() -> Self {
        Self
    }
}

impl Daemonizer for SystemDaemonizer {
    fn daemonize(&self, paths: &RuntimePaths) -> Result<(), DaemonizeError> {
        let log = open_log(paths.log_path())?;
        info!(
            target: PROCESS_TARGET,
            runtime = %paths.runtime_dir().display(),
            log = %paths.log_path().display(),
            "detaching into background"
        );
        Daemon::new()
            .work_dir(paths.runtime_dir())
            .name(OsStr::new(env!("CARGO_PKG_NAME")))
            .stderr(log)
            .start()?;
        info!(
            target: PROCESS_TARGET,
            pid = std::process::id(),
            "detached"
        );
        Ok(())
    }
}

/// Opens the log for appending, readable by the owner only. Clipboard text
/// can appear in debug output.
fn open_log(path: &Path) -> Result<File, DaemonizeError> {
    let mut options = OpenOptions::new();
    options.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path).map_err(|source| DaemonizeError::LogFile {
        path: path.to_path_buf(),
        source,
    })
}
