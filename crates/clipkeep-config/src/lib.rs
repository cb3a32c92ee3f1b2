//! Shared configuration for the clipkeep server, client and watcher.
//!
//! Values are layered by `ortho_config`: built-in defaults, then the
//! configuration file (`--config-path` or `CLIPKEEP_CONFIG_PATH`), then
//! `CLIPKEEP_*` environment variables, then command-line flags.
//!
//! The crate also derives the filesystem layout both binaries agree on:
//! [`RuntimePaths`] for the lock, pid and health files next to the socket,
//! and [`StoragePaths`] for the history directory, the options file and the
//! rules file under the data directory.

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

mod defaults;
mod logging;
mod runtime;
mod socket;
mod storage;

pub use defaults::{
    DEFAULT_LOG_FILTER, DEFAULT_TCP_PORT, DEFAULT_WATCHER_PROGRAM, default_data_dir,
    default_log_filter, default_log_filter_string, default_log_format, default_socket_endpoint,
    default_watcher_program,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use runtime::{RuntimePaths, RuntimePathsError};
pub use socket::{SocketEndpoint, SocketParseError, SocketPreparationError};
pub use storage::{StoragePaths, StoragePathsError};

/// Layered configuration shared by every clipkeep binary.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "CLIPKEEP")]
pub struct Config {
    /// Endpoint the server listens on and the client connects to.
    #[ortho_config(default = default_socket_endpoint())]
    #[serde(default = "default_socket_endpoint")]
    pub daemon_socket: SocketEndpoint,
    /// `tracing` filter directive applied by the server and the watcher.
    #[ortho_config(default = default_log_filter_string())]
    #[serde(default = "default_log_filter_string")]
    pub log_filter: String,
    /// Output format of structured logs.
    #[ortho_config(default = default_log_format())]
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
    /// Directory holding history files, options and rules.
    #[ortho_config(default = default_data_dir())]
    #[serde(default = "default_data_dir")]
    pub data_dir: Utf8PathBuf,
    /// Program spawned as the clipboard watcher.
    #[ortho_config(default = default_watcher_program())]
    #[serde(default = "default_watcher_program")]
    pub watcher_program: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daemon_socket: default_socket_endpoint(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            data_dir: default_data_dir(),
            watcher_program: default_watcher_program(),
        }
    }
}

impl Config {
    /// Endpoint used for client connections.
    #[must_use]
    pub const fn daemon_socket(&self) -> &SocketEndpoint {
        &self.daemon_socket
    }

    /// Log filter directive.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Structured log format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Data directory root.
    #[must_use]
    pub const fn data_dir(&self) -> &Utf8PathBuf {
        &self.data_dir
    }

    /// Watcher program name or path.
    #[must_use]
    pub fn watcher_program(&self) -> &str {
        self.watcher_program.as_str()
    }
}
