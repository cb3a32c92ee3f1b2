//! Failures binding the client socket or running the accept loop.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Errors raised by [`super::SocketListener`].
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The configured TCP host could not be looked up.
    #[error("cannot resolve {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },
    /// The lookup succeeded without yielding an address.
    #[error("{host}:{port} resolved to no addresses")]
    NoAddress { host: String, port: u16 },
    #[error("cannot listen on {addr}: {source}")]
    BindTcp {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[cfg(not(unix))]
    #[error("unix socket endpoints are not available on this platform: {endpoint}")]
    UnsupportedUnix { endpoint: String },
    #[cfg(unix)]
    #[error("cannot listen on {path}: {source}")]
    BindUnix {
        path: String,
        #[source]
        source: io::Error,
    },
    /// The socket file could not be made private to its owner.
    #[cfg(unix)]
    #[error("cannot restrict access to {path}: {source}")]
    UnixPermissions {
        path: String,
        #[source]
        source: io::Error,
    },
    /// Another server answers on the socket path.
    #[cfg(unix)]
    #[error("a server is already listening on {path}")]
    UnixInUse { path: String },
    #[cfg(unix)]
    #[error("{path} exists and is not a socket")]
    UnixNotSocket { path: String },
    /// Checking whether an existing socket file is still served failed.
    #[cfg(unix)]
    #[error("cannot check whether {path} is still served: {source}")]
    UnixLiveness {
        path: String,
        #[source]
        source: io::Error,
    },
    #[cfg(unix)]
    #[error("cannot remove stale socket {path}: {source}")]
    UnixCleanup {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("cannot switch the socket to non-blocking accepts: {source}")]
    NonBlocking {
        #[source]
        source: io::Error,
    },
    #[error("cannot start the accept thread: {source}")]
    Spawn {
        #[source]
        source: io::Error,
    },
    #[error("accept thread panicked")]
    ThreadPanic,
}
