//! Connection handler that runs client sessions against the engine.
//!
//! [`SessionHandler`] implements the transport's `ConnectionHandler` trait.
//! It reads one JSONL request line, executes the command on the engine and
//! streams the reply back. Interactive sessions then stay attached and
//! receive notifications until either side hangs up.

use std::io::{self, Read};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::thread;
use std::time::Duration;

use clipkeep_types::channel::MAX_FRAME_BYTES;
use clipkeep_types::session::{Notification, SessionRole};
use tracing::{debug, debug_span, warn};

use crate::engine::EngineHandle;
use crate::transport::{ConnectionHandler, ConnectionStream, SessionId};

use super::DISPATCH_TARGET;
use super::errors::DispatchError;
use super::request::ParsedRequest;
use super::response::ResponseWriter;

/// Room for the verb, the JSON framing and text arguments around a binary
/// payload.
const REQUEST_ENVELOPE_BYTES: usize = 64 * 1024;

/// Maximum size of a single request line in bytes. A `write` or `copy`
/// carrying the largest payload the snapshot channel delivers still fits
/// after base64 expansion.
pub(crate) const MAX_REQUEST_BYTES: usize =
    MAX_FRAME_BYTES.div_ceil(3) * 4 + REQUEST_ENVELOPE_BYTES;

const READ_CHUNK_BYTES: usize = 64 * 1024;

/// How often an idle interactive session checks for a hang-up.
const HANGUP_POLL: Duration = Duration::from_millis(200);

/// Connection handler that parses requests and executes them on the engine.
#[derive(Debug, Clone)]
pub struct SessionHandler {
    engine: EngineHandle,
}

impl SessionHandler {
    /// Creates a handler issuing commands through `engine`.
    pub fn new(engine: EngineHandle) -> Self {
        Self { engine }
    }

    fn dispatch(&self, mut stream: ConnectionStream) {
        let request_bytes = match read_request_line(&mut stream) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!(target: DISPATCH_TARGET, "client disconnected without request");
                return;
            }
            Err(error) => {
                warn!(target: DISPATCH_TARGET, %error, "failed to read request");
                reject(&mut stream, &error);
                return;
            }
        };

        let request = match ParsedRequest::parse(&request_bytes) {
            Ok(request) => request,
            Err(error) => {
                warn!(target: DISPATCH_TARGET, %error, "malformed request");
                reject(&mut stream, &error);
                return;
            }
        };

        debug!(
            target: DISPATCH_TARGET,
            command = %request.command,
            arguments = request.arguments.len(),
            role = ?request.session,
            "dispatching request"
        );

        match request.session {
            SessionRole::Oneshot => {
                let mut writer = ResponseWriter::new(&mut stream);
                self.respond(&mut writer, request);
            }
            SessionRole::Interactive => self.interactive(stream, request),
        }
    }

    /// Executes the request and writes its reply. Returns false when the
    /// client can no longer be written to.
    fn respond(&self, writer: &mut ResponseWriter<&mut ConnectionStream>, request: ParsedRequest) -> bool {
        let written = match self.engine.execute(request.command, request.arguments) {
            Ok(reply) => writer.write_reply(reply),
            Err(error) => {
                debug!(target: DISPATCH_TARGET, %error, "command failed");
                writer.write_error(&error)
            }
        };
        if let Err(error) = written {
            warn!(target: DISPATCH_TARGET, %error, "failed to write response");
            return false;
        }
        true
    }

    /// Subscribes before running the command, so no change applied by the
    /// command or after it is missed.
    fn interactive(&self, mut stream: ConnectionStream, request: ParsedRequest) {
        let notifications = match self.engine.subscribe() {
            Ok(notifications) => notifications,
            Err(error) => {
                warn!(target: DISPATCH_TARGET, %error, "failed to subscribe session");
                reject(&mut stream, &error);
                return;
            }
        };
        if !self.respond(&mut ResponseWriter::new(&mut stream), request) {
            return;
        }
        let hangup = match watch_for_hangup(&stream) {
            Ok(hangup) => hangup,
            Err(error) => {
                warn!(target: DISPATCH_TARGET, %error, "cannot watch session for hang-up");
                return;
            }
        };
        forward_notifications(&mut stream, &notifications, &hangup);
        if let Err(error) = stream.shutdown()
            && error.kind() != io::ErrorKind::NotConnected
        {
            debug!(target: DISPATCH_TARGET, %error, "session shutdown failed");
        }
        debug!(target: DISPATCH_TARGET, "interactive session closed");
    }
}

impl ConnectionHandler for SessionHandler {
    fn handle(&self, session: SessionId, stream: ConnectionStream) {
        let span = debug_span!(target: DISPATCH_TARGET, "session", id = session);
        let _entered = span.enter();
        self.dispatch(stream);
    }
}

/// Streams notifications until the client hangs up or the engine stops.
fn forward_notifications(
    stream: &mut ConnectionStream,
    notifications: &Receiver<Notification>,
    hangup: &Receiver<()>,
) {
    let mut writer = ResponseWriter::new(stream);
    loop {
        match hangup.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => return,
            Err(TryRecvError::Empty) => {}
        }
        match notifications.recv_timeout(HANGUP_POLL) {
            Ok(event) => {
                if let Err(error) = writer.write_notification(event) {
                    debug!(target: DISPATCH_TARGET, %error, "session stopped accepting notifications");
                    return;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

/// Reads from a second handle on the connection and signals once the
/// client closes its end. Extra bytes from the client are discarded.
fn watch_for_hangup(stream: &ConnectionStream) -> io::Result<Receiver<()>> {
    let mut reader = stream.try_clone()?;
    let (sender, hangup) = mpsc::channel();
    thread::Builder::new()
        .name("clipkeep-session-reader".to_owned())
        .spawn(move || {
            let mut buffer = [0_u8; 256];
            while matches!(read_with_retry(&mut reader, &mut buffer), Ok(n) if n > 0) {}
            if sender.send(()).is_err() {
                debug!(target: DISPATCH_TARGET, "session ended before the client hung up");
            }
        })?;
    Ok(hangup)
}

/// Sends `error` as the session's only response.
fn reject(stream: &mut ConnectionStream, error: &DispatchError) {
    if let Err(write_error) = ResponseWriter::new(stream).write_error(error) {
        debug!(target: DISPATCH_TARGET, error = %write_error, "client gone before the error was sent");
    }
}

/// Reads a bounded JSONL request line from the stream.
///
/// Returns `Ok(None)` if the client disconnects without sending data.
/// Returns `Ok(Some(bytes))` when a complete line (or EOF with partial data)
/// is received. Returns an error if reading fails or the request exceeds the
/// maximum size.
fn read_request_line(stream: &mut ConnectionStream) -> Result<Option<Vec<u8>>, DispatchError> {
    let mut buffer = Vec::new();
    let mut chunk = vec![0_u8; READ_CHUNK_BYTES];

    loop {
        let bytes_read = read_with_retry(stream, &mut chunk)?;

        if bytes_read == 0 {
            return Ok(if buffer.is_empty() {
                None
            } else {
                Some(buffer)
            });
        }

        if let Some(newline_pos) = chunk[..bytes_read].iter().position(|b| *b == b'\n') {
            buffer.extend_from_slice(&chunk[..=newline_pos]);
            enforce_limit(buffer.len())?;
            return Ok(Some(buffer));
        }

        buffer.extend_from_slice(&chunk[..bytes_read]);
        enforce_limit(buffer.len())?;
    }
}

/// Reads from the stream, retrying on interrupts.
fn read_with_retry(stream: &mut ConnectionStream, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match stream.read(buf) {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Enforces the maximum request size limit.
fn enforce_limit(size: usize) -> Result<(), DispatchError> {
    if size > MAX_REQUEST_BYTES {
        return Err(DispatchError::request_too_large(size, MAX_REQUEST_BYTES));
    }
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use std::io::Write;
    use std::os::unix::net::UnixStream;

    use clipkeep_types::session::{Argument, CommandRequest};

    use super::*;

    fn read_sent_line(line: Vec<u8>) -> Result<Option<Vec<u8>>, DispatchError> {
        let (mut client, server) = UnixStream::pair().expect("socket pair");
        let writer = thread::spawn(move || {
            let _written = client.write_all(&line);
        });
        let mut stream = ConnectionStream::Unix(server);
        let result = read_request_line(&mut stream);
        drop(stream);
        writer.join().expect("writer thread");
        result
    }

    #[test]
    fn binary_writes_above_a_mebibyte_are_accepted() {
        let payload = vec![0xff_u8; 900 * 1024];
        let request = CommandRequest::new(
            "write",
            vec![Argument::Text("image/png".to_owned()), Argument::from_bytes(payload)],
        );
        let mut line = serde_json::to_vec(&request).expect("encode request");
        line.push(b'\n');

        let received = read_sent_line(line.clone()).expect("request accepted");
        assert_eq!(received, Some(line));
    }

    #[test]
    fn limit_covers_the_largest_encoded_frame() {
        let encoded = base64::encoded_len(MAX_FRAME_BYTES, true).expect("encoded length");
        assert!(enforce_limit(encoded + 1024).is_ok());
    }

    #[test]
    fn oversized_requests_are_rejected() {
        assert!(matches!(
            enforce_limit(MAX_REQUEST_BYTES + 1),
            Err(DispatchError::RequestTooLarge { .. })
        ));
    }
}
