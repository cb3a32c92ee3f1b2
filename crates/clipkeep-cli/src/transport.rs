//! Socket transport helpers for the clipkeep client.
//!
//! The functions here establish connections to the server socket and wrap
//! the resulting streams in a uniform [`Connection`] type so that the rest
//! of the CLI logic can remain transport agnostic.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use clipkeep_config::SocketEndpoint;

#[cfg(unix)]
use std::os::unix::net::UnixStream;

#[cfg(unix)]
use socket2::{Domain, SockAddr, Socket, Type};

use crate::AppError;
use crate::errors::is_server_absent;

pub(crate) const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) enum Connection {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            Self::Unix(stream) => stream.flush(),
        }
    }
}

pub(crate) fn connect(endpoint: &SocketEndpoint) -> Result<Connection, AppError> {
    let endpoint_display = endpoint.to_string();
    let opened = match endpoint {
        SocketEndpoint::Tcp { host, port } => {
            let address = resolve_tcp_address(host, *port).map_err(|source| AppError::Resolve {
                endpoint: endpoint_display.clone(),
                source,
            })?;
            connect_tcp(&address)
        }
        #[cfg(not(unix))]
        SocketEndpoint::Unix { .. } => {
            return Err(AppError::UnsupportedUnixTransport(endpoint_display));
        }
        #[cfg(unix)]
        SocketEndpoint::Unix { .. } => open_stream(endpoint),
    };
    opened.map_err(|source| {
        if is_server_absent(&source) {
            AppError::ConnectionRefused {
                endpoint: endpoint_display,
                source,
            }
        } else {
            AppError::Connect {
                endpoint: endpoint_display,
                source,
            }
        }
    })
}

/// Connects without classifying failures. Lifecycle checks use this to
/// tell a missing server from a broken one.
pub(crate) fn open_stream(endpoint: &SocketEndpoint) -> io::Result<Connection> {
    match endpoint {
        SocketEndpoint::Tcp { host, port } => connect_tcp(&resolve_tcp_address(host, *port)?),
        #[cfg(unix)]
        SocketEndpoint::Unix { path } => connect_unix(path.as_str()),
        #[cfg(not(unix))]
        SocketEndpoint::Unix { .. } => Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "unix sockets unsupported on this platform",
        )),
    }
}

fn connect_tcp(address: &SocketAddr) -> io::Result<Connection> {
    TcpStream::connect_timeout(address, CONNECTION_TIMEOUT).map(Connection::Tcp)
}

fn resolve_tcp_address(host: &str, port: u16) -> io::Result<SocketAddr> {
    let mut addrs = (host, port).to_socket_addrs()?;
    addrs
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "no resolved addresses"))
}

#[cfg(unix)]
fn connect_unix(path: &str) -> io::Result<Connection> {
    let socket = Socket::new(Domain::UNIX, Type::STREAM, None)?;
    let address = SockAddr::unix(path)?;
    socket.connect_timeout(&address, CONNECTION_TIMEOUT)?;
    let stream = UnixStream::from(std::os::fd::OwnedFd::from(socket));
    Ok(Connection::Unix(stream))
}
