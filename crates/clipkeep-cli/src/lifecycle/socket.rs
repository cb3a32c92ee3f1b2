//! Whether a server answers on the configured socket.

use clipkeep_config::SocketEndpoint;

use super::error::LifecycleError;
use crate::errors::is_server_absent;
use crate::transport::open_stream;

/// Refuses to start a second server on a socket that already answers. A
/// Unix socket file nobody listens on is fine; the server replaces it.
pub(super) fn ensure_socket_available(endpoint: &SocketEndpoint) -> Result<(), LifecycleError> {
    if server_answers(endpoint)? {
        return Err(LifecycleError::SocketInUse {
            endpoint: endpoint.to_string(),
        });
    }
    Ok(())
}

/// `true` when a connection succeeds, `false` when nothing listens.
pub(super) fn server_answers(endpoint: &SocketEndpoint) -> Result<bool, LifecycleError> {
    match open_stream(endpoint) {
        Ok(_connection) => Ok(true),
        Err(error) if is_server_absent(&error) => Ok(false),
        Err(source) => Err(LifecycleError::SocketCheck {
            endpoint: endpoint.to_string(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::net::TcpListener;

    use rstest::rstest;

    use super::*;

    #[test]
    fn busy_tcp_socket_blocks_a_second_start() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind listener");
        let addr = listener.local_addr().expect("local addr");
        let endpoint = SocketEndpoint::tcp(addr.ip().to_string(), addr.port());

        assert!(server_answers(&endpoint).expect("listener answers"));
        let error = ensure_socket_available(&endpoint).expect_err("socket busy");
        assert!(error.to_string().contains("already in use"));
    }

    #[test]
    fn closed_tcp_port_is_free() {
        let port = TcpListener::bind(("127.0.0.1", 0))
            .and_then(|listener| listener.local_addr())
            .expect("reserve port")
            .port();
        ensure_socket_available(&SocketEndpoint::tcp("127.0.0.1", port)).expect("port free");
    }

    #[cfg(unix)]
    #[test]
    fn socket_file_without_a_listener_is_free() {
        use std::os::unix::net::UnixListener;

        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("clipkeepd.sock");
        drop(UnixListener::bind(&path).expect("bind listener"));
        assert!(path.exists(), "stale socket file stays behind");

        let endpoint = SocketEndpoint::unix(path.to_str().expect("utf8 path").to_owned());
        ensure_socket_available(&endpoint).expect("stale socket is reusable");
    }

    #[cfg(unix)]
    #[test]
    fn live_unix_socket_answers() {
        use std::os::unix::net::UnixListener;

        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("clipkeepd.sock");
        let _listener = UnixListener::bind(&path).expect("bind listener");
        let endpoint = SocketEndpoint::unix(path.to_str().expect("utf8 path").to_owned());
        assert!(server_answers(&endpoint).expect("listener answers"));
    }

    #[rstest]
    #[case::refused(io::ErrorKind::ConnectionRefused, true)]
    #[case::no_socket_file(io::ErrorKind::NotFound, true)]
    #[case::unresolvable(io::ErrorKind::AddrNotAvailable, true)]
    #[case::permission_denied(io::ErrorKind::PermissionDenied, false)]
    #[case::timed_out(io::ErrorKind::TimedOut, false)]
    fn only_missing_listeners_count_as_free(#[case] kind: io::ErrorKind, #[case] absent: bool) {
        assert_eq!(is_server_absent(&io::Error::new(kind, "connect")), absent);
    }
}
