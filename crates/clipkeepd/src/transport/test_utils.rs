//! Connection handlers for listener tests.

use std::io::Read;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};

use super::{ConnectionHandler, ConnectionStream, SessionId};

/// Records session numbers. With `hold` set, each session stays open until
/// the client closes its end.
pub(crate) struct RecordingHandler {
    sessions: Mutex<Sender<SessionId>>,
    hold: bool,
}

impl RecordingHandler {
    pub(crate) fn new(hold: bool) -> (Receiver<SessionId>, Arc<Self>) {
        let (sender, sessions) = mpsc::channel();
        let handler = Arc::new(Self {
            sessions: Mutex::new(sender),
            hold,
        });
        (sessions, handler)
    }
}

impl ConnectionHandler for RecordingHandler {
    fn handle(&self, session: SessionId, mut stream: ConnectionStream) {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .send(session)
            .ok();
        if self.hold {
            let mut sink = Vec::new();
            stream.read_to_end(&mut sink).ok();
        }
    }
}
