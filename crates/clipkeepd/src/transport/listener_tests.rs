//! Tests for the client socket listener.

use std::io::Read;
use std::net::TcpStream;
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};

use rstest::{fixture, rstest};
use tempfile::TempDir;

use clipkeep_config::SocketEndpoint;

use super::listener::{ListenerHandle, SocketListener};
use super::{ListenerError, RecordingHandler, SessionId};

const WAIT: Duration = Duration::from_secs(2);

#[fixture]
fn socket_dir() -> TempDir {
    tempfile::tempdir().expect("temp dir")
}

fn start_tcp(limit: usize, hold: bool) -> (ListenerHandle, std::net::SocketAddr, Receiver<SessionId>) {
    let listener = SocketListener::bind(&SocketEndpoint::tcp("127.0.0.1", 0))
        .expect("bind tcp listener")
        .with_session_limit(limit);
    let addr = listener.local_addr().expect("tcp listeners report their address");
    let (sessions, handler) = RecordingHandler::new(hold);
    let handle = listener.start(handler).expect("start listener");
    (handle, addr, sessions)
}

fn wait_for_active(handle: &ListenerHandle, expected: usize) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if handle.active_sessions() == expected {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn sessions_are_numbered_in_accept_order() {
    let (handle, addr, sessions) = start_tcp(8, false);

    let _first = TcpStream::connect(addr).expect("connect first client");
    let first = sessions.recv_timeout(WAIT).expect("first session");
    let _second = TcpStream::connect(addr).expect("connect second client");
    let second = sessions.recv_timeout(WAIT).expect("second session");

    assert_eq!((first, second), (1, 2));
    handle.shutdown();
    handle.join().expect("join listener");
}

#[test]
fn connections_beyond_the_session_limit_are_closed() {
    let (handle, addr, sessions) = start_tcp(1, true);

    let held = TcpStream::connect(addr).expect("connect held client");
    sessions.recv_timeout(WAIT).expect("held session");
    assert!(wait_for_active(&handle, 1));

    let mut refused = TcpStream::connect(addr).expect("connect refused client");
    refused.set_read_timeout(Some(WAIT)).expect("read timeout");
    let mut buffer = Vec::new();
    assert_eq!(refused.read_to_end(&mut buffer).expect("closed by server"), 0);
    assert!(sessions.try_recv().is_err(), "refused connection was served");

    drop(held);
    assert!(wait_for_active(&handle, 0), "held session released its place");
    let _next = TcpStream::connect(addr).expect("connect after release");
    assert_eq!(sessions.recv_timeout(WAIT).expect("next session"), 2);

    handle.shutdown();
    handle.join().expect("join listener");
}

#[cfg(unix)]
fn unix_endpoint(dir: &TempDir) -> (std::path::PathBuf, SocketEndpoint) {
    let path = dir.path().join("clipkeepd.sock");
    let endpoint = SocketEndpoint::unix(path.to_str().expect("utf8 path").to_owned());
    (path, endpoint)
}

#[cfg(unix)]
#[rstest]
fn unix_sockets_are_private_and_removed_on_shutdown(socket_dir: TempDir) {
    use std::os::unix::fs::PermissionsExt;

    let (path, endpoint) = unix_endpoint(&socket_dir);
    let listener = SocketListener::bind(&endpoint).expect("bind unix listener");
    let mode = std::fs::metadata(&path).expect("socket metadata").permissions().mode();
    assert_eq!(mode & 0o777, 0o600);

    let (sessions, handler) = RecordingHandler::new(false);
    let handle = listener.start(handler).expect("start listener");
    std::os::unix::net::UnixStream::connect(&path).expect("connect unix client");
    assert_eq!(sessions.recv_timeout(WAIT).expect("session"), 1);

    handle.shutdown();
    handle.join().expect("join listener");
    assert!(!path.exists(), "socket file left behind");
}

#[cfg(unix)]
#[rstest]
fn sockets_of_dead_servers_are_replaced(socket_dir: TempDir) {
    let (path, endpoint) = unix_endpoint(&socket_dir);
    drop(std::os::unix::net::UnixListener::bind(&path).expect("bind stale listener"));
    assert!(path.exists());

    let listener = SocketListener::bind(&endpoint).expect("stale socket replaced");
    drop(listener);
}

#[cfg(unix)]
#[rstest]
fn sockets_of_live_servers_are_refused(socket_dir: TempDir) {
    let (path, endpoint) = unix_endpoint(&socket_dir);
    let _live = std::os::unix::net::UnixListener::bind(&path).expect("bind live listener");

    let error = SocketListener::bind(&endpoint).expect_err("live socket refused");
    assert!(matches!(error, ListenerError::UnixInUse { .. }));
    assert!(path.exists(), "live socket kept");
}

#[cfg(unix)]
#[rstest]
fn other_files_at_the_socket_path_are_refused(socket_dir: TempDir) {
    let (path, endpoint) = unix_endpoint(&socket_dir);
    std::fs::write(&path, b"not a socket").expect("write plain file");

    let error = SocketListener::bind(&endpoint).expect_err("plain file refused");
    assert!(matches!(error, ListenerError::UnixNotSocket { .. }));
}
