//! Accept loop for client sessions.
//!
//! The loop polls a non-blocking socket so a shutdown request is noticed
//! within one idle period. Each accepted connection gets the next session
//! number and its own thread. At most [`MAX_SESSIONS`] sessions run at
//! once; connections beyond that are closed unanswered and logged. Unix
//! socket files are created readable and writable by their owner only, and
//! removed again when the loop ends.

use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use clipkeep_config::SocketEndpoint;

use super::{ConnectionHandler, ConnectionStream, LISTENER_TARGET, ListenerError, SessionId};

#[cfg(unix)]
use std::os::unix::net::UnixListener;

const IDLE_POLL: Duration = Duration::from_millis(25);
const FAILURE_PAUSE: Duration = Duration::from_millis(150);

/// Sessions served at the same time.
pub(crate) const MAX_SESSIONS: usize = 64;

#[derive(Debug)]
enum Socket {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

impl Socket {
    fn set_nonblocking(&self) -> io::Result<()> {
        match self {
            Self::Tcp(listener) => listener.set_nonblocking(true),
            #[cfg(unix)]
            Self::Unix(listener) => listener.set_nonblocking(true),
        }
    }

    /// Next pending connection, `None` when nobody is waiting.
    fn accept(&self) -> io::Result<Option<ConnectionStream>> {
        let accepted = match self {
            Self::Tcp(listener) => listener.accept().and_then(|(stream, _)| {
                stream.set_nonblocking(false)?;
                Ok(ConnectionStream::Tcp(stream))
            }),
            #[cfg(unix)]
            Self::Unix(listener) => listener.accept().and_then(|(stream, _)| {
                stream.set_nonblocking(false)?;
                Ok(ConnectionStream::Unix(stream))
            }),
        };
        match accepted {
            Ok(stream) => Ok(Some(stream)),
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(error) => Err(error),
        }
    }
}

/// Bound client socket, not yet accepting.
#[derive(Debug)]
pub(crate) struct SocketListener {
    endpoint: SocketEndpoint,
    socket: Socket,
    session_limit: usize,
}

impl SocketListener {
    /// Binds `endpoint`. A Unix socket file left by a server that no longer
    /// answers is replaced; one that still answers is refused with
    /// [`ListenerError::UnixInUse`].
    pub(crate) fn bind(endpoint: &SocketEndpoint) -> Result<Self, ListenerError> {
        let socket = match endpoint {
            SocketEndpoint::Tcp { host, port } => Socket::Tcp(bind_tcp(host, *port)?),
            #[cfg(unix)]
            SocketEndpoint::Unix { path } => Socket::Unix(unix::bind(path.as_std_path())?),
            #[cfg(not(unix))]
            SocketEndpoint::Unix { .. } => {
                return Err(ListenerError::UnsupportedUnix {
                    endpoint: endpoint.to_string(),
                });
            }
        };
        Ok(Self {
            endpoint: endpoint.clone(),
            socket,
            session_limit: MAX_SESSIONS,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_session_limit(mut self, limit: usize) -> Self {
        self.session_limit = limit;
        self
    }

    #[cfg(test)]
    pub(crate) fn local_addr(&self) -> Option<SocketAddr> {
        match &self.socket {
            Socket::Tcp(listener) => listener.local_addr().ok(),
            #[cfg(unix)]
            Socket::Unix(_) => None,
        }
    }

    /// Starts accepting on a background thread.
    pub(crate) fn start(
        self,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Result<ListenerHandle, ListenerError> {
        if let Err(source) = self.socket.set_nonblocking() {
            self.remove_socket_file();
            return Err(ListenerError::NonBlocking { source });
        }
        let stop = Arc::new(AtomicBool::new(false));
        let sessions = Arc::new(Sessions::new(self.session_limit));
        let accept_loop = AcceptLoop {
            listener: self,
            stop: Arc::clone(&stop),
            sessions: Arc::clone(&sessions),
            handler,
        };
        let thread = thread::Builder::new()
            .name("clipkeep-listener".to_owned())
            .spawn(move || accept_loop.run())
            .map_err(|source| ListenerError::Spawn { source })?;
        Ok(ListenerHandle {
            stop,
            sessions,
            thread: Some(thread),
        })
    }

    fn remove_socket_file(&self) {
        #[cfg(unix)]
        if let SocketEndpoint::Unix { path } = &self.endpoint {
            unix::remove(path.as_std_path());
        }
    }
}

/// Running accept loop.
pub(crate) struct ListenerHandle {
    stop: Arc<AtomicBool>,
    sessions: Arc<Sessions>,
    thread: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    /// Asks the loop to stop accepting. Running sessions are not touched.
    pub(crate) fn shutdown(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Sessions currently being served.
    pub(crate) fn active_sessions(&self) -> usize {
        self.sessions.active.load(Ordering::SeqCst)
    }

    pub(crate) fn join(mut self) -> Result<(), ListenerError> {
        match self.thread.take().map(JoinHandle::join) {
            Some(Err(_)) => Err(ListenerError::ThreadPanic),
            Some(Ok(())) | None => Ok(()),
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Session numbering and the count of sessions in flight.
#[derive(Debug)]
struct Sessions {
    limit: usize,
    last_id: AtomicU64,
    active: AtomicUsize,
}

impl Sessions {
    const fn new(limit: usize) -> Self {
        Self {
            limit,
            last_id: AtomicU64::new(0),
            active: AtomicUsize::new(0),
        }
    }

    /// Reserves a place for one more session, `None` at the limit.
    fn admit(self: &Arc<Self>) -> Option<(SessionId, Admission)> {
        self.active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |active| {
                (active < self.limit).then(|| active.saturating_add(1))
            })
            .ok()?;
        let id = self.last_id.fetch_add(1, Ordering::SeqCst).saturating_add(1);
        Some((id, Admission(Arc::clone(self))))
    }
}

/// Holds a session's place until its thread ends.
struct Admission(Arc<Sessions>);

impl Drop for Admission {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

struct AcceptLoop {
    listener: SocketListener,
    stop: Arc<AtomicBool>,
    sessions: Arc<Sessions>,
    handler: Arc<dyn ConnectionHandler>,
}

impl AcceptLoop {
    fn run(self) {
        info!(
            target: LISTENER_TARGET,
            endpoint = %self.listener.endpoint,
            limit = self.sessions.limit,
            "accepting client sessions"
        );
        let mut last_failure = None::<io::ErrorKind>;
        while !self.stop.load(Ordering::SeqCst) {
            match self.listener.socket.accept() {
                Ok(Some(stream)) => {
                    last_failure = None;
                    self.serve(stream);
                }
                Ok(None) => thread::sleep(IDLE_POLL),
                Err(error) => {
                    // Repeats of the same failure are not logged again.
                    if last_failure != Some(error.kind()) {
                        warn!(target: LISTENER_TARGET, %error, "accept failed");
                    }
                    last_failure = Some(error.kind());
                    thread::sleep(FAILURE_PAUSE);
                }
            }
        }
        self.listener.remove_socket_file();
        info!(target: LISTENER_TARGET, "stopped accepting client sessions");
    }

    fn serve(&self, stream: ConnectionStream) {
        let Some((session, admission)) = self.sessions.admit() else {
            warn!(
                target: LISTENER_TARGET,
                limit = self.sessions.limit,
                "session limit reached; connection closed"
            );
            if let Err(error) = stream.shutdown() {
                debug!(target: LISTENER_TARGET, %error, "refused connection already closed");
            }
            return;
        };
        let handler = Arc::clone(&self.handler);
        let spawned = thread::Builder::new()
            .name(format!("clipkeep-session-{session}"))
            .spawn(move || {
                let _admission = admission;
                debug!(target: LISTENER_TARGET, session, "session opened");
                handler.handle(session, stream);
                debug!(target: LISTENER_TARGET, session, "session closed");
            });
        if let Err(error) = spawned {
            warn!(target: LISTENER_TARGET, session, %error, "cannot start session thread");
        }
    }
}

fn bind_tcp(host: &str, port: u16) -> Result<TcpListener, ListenerError> {
    let addr = (host, port)
        .to_socket_addrs()
        .map_err(|source| ListenerError::Resolve {
            host: host.to_owned(),
            port,
            source,
        })?
        .next()
        .ok_or_else(|| ListenerError::NoAddress {
            host: host.to_owned(),
            port,
        })?;
    TcpListener::bind(addr).map_err(|source| ListenerError::BindTcp { addr, source })
}

#[cfg(unix)]
mod unix {
    use std::fs;
    use std::io;
    use std::os::unix::fs::{FileTypeExt, PermissionsExt};
    use std::os::unix::net::{UnixListener, UnixStream};
    use std::path::Path;

    use tracing::warn;

    use super::{LISTENER_TARGET, ListenerError};

    /// Owner read and write.
    const SOCKET_MODE: u32 = 0o600;

    pub(super) fn bind(path: &Path) -> Result<UnixListener, ListenerError> {
        remove_if_stale(path)?;
        let listener = UnixListener::bind(path).map_err(|source| ListenerError::BindUnix {
            path: path.display().to_string(),
            source,
        })?;
        if let Err(source) = fs::set_permissions(path, fs::Permissions::from_mode(SOCKET_MODE)) {
            remove(path);
            return Err(ListenerError::UnixPermissions {
                path: path.display().to_string(),
                source,
            });
        }
        Ok(listener)
    }

    fn remove_if_stale(path: &Path) -> Result<(), ListenerError> {
        let check_failed = |source| ListenerError::UnixLiveness {
            path: path.display().to_string(),
            source,
        };
        let metadata = match fs::symlink_metadata(path) {
            Ok(metadata) => metadata,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(error) => return Err(check_failed(error)),
        };
        if !metadata.file_type().is_socket() {
            return Err(ListenerError::UnixNotSocket {
                path: path.display().to_string(),
            });
        }
        match UnixStream::connect(path) {
            Ok(_live) => Err(ListenerError::UnixInUse {
                path: path.display().to_string(),
            }),
            Err(error)
                if matches!(
                    error.kind(),
                    io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound
                ) =>
            {
                fs::remove_file(path).map_err(|source| ListenerError::UnixCleanup {
                    path: path.display().to_string(),
                    source,
                })
            }
            Err(error) => Err(check_failed(error)),
        }
    }

    pub(super) fn remove(path: &Path) {
        if let Err(error) = fs::remove_file(path)
            && error.kind() != io::ErrorKind::NotFound
        {
            warn!(
                target: LISTENER_TARGET,
                %error,
                path = %path.display(),
                "cannot remove socket file"
            );
        }
    }
}
