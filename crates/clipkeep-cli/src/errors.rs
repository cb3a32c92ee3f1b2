//! Error types for the CLI runtime.

use std::io;
use std::sync::Arc;

use clipkeep_types::session::PayloadError;
use thiserror::Error;

use crate::lifecycle::LifecycleError;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error("command name must be valid UTF-8: {name:?}")]
    InvalidCommand { name: String },
    #[error("failed to read standard input: {0}")]
    ReadStdin(#[source] io::Error),
    #[error("failed to resolve server address {endpoint}: {source}")]
    Resolve {
        endpoint: String,
        #[source]
        source: io::Error,
    },
    #[error("cannot connect to clipkeepd at {endpoint}: {source}; start it with 'clipkeep daemon start'")]
    ConnectionRefused {
        endpoint: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to connect to clipkeepd at {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: io::Error,
    },
    #[cfg(not(unix))]
    #[error("platform does not support Unix sockets: {0}")]
    UnsupportedUnixTransport(String),
    #[error("failed to serialise command request: {0}")]
    SerialiseRequest(#[source] serde_json::Error),
    #[error("failed to send request to clipkeepd: {0}")]
    SendRequest(#[source] io::Error),
    #[error("failed to read response from clipkeepd: {0}")]
    ReadResponse(#[source] io::Error),
    #[error("failed to parse server message: {0}")]
    ParseMessage(#[source] serde_json::Error),
    #[error("failed to decode server output: {0}")]
    DecodeStream(#[source] PayloadError),
    #[error("failed to write output: {0}")]
    ForwardResponse(#[source] io::Error),
    #[error("failed to render notification: {0}")]
    RenderEvent(#[source] serde_json::Error),
    #[error("connection to clipkeepd lost before the command finished")]
    ConnectionLost,
    #[error("daemon lifecycle command failed: {0}")]
    Lifecycle(#[from] LifecycleError),
}

impl AppError {
    /// Exit status reported for the error. Transport faults use `2`, like
    /// the server's infrastructure failures; everything else uses `1`.
    pub(crate) const fn exit_status(&self) -> u8 {
        match self {
            Self::Resolve { .. }
            | Self::ConnectionRefused { .. }
            | Self::Connect { .. }
            | Self::SendRequest(_)
            | Self::ReadResponse(_)
            | Self::ConnectionLost => 2,
            _ => 1,
        }
    }
}

/// Determines whether a connect error means no server is listening.
pub(crate) fn is_server_absent(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound | io::ErrorKind::AddrNotAvailable
    )
}
