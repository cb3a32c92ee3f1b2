//! Minimal session client speaking the JSONL protocol over a Unix socket.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;

use clipkeep_types::session::{
    Argument, CommandRequest, DaemonMessage, Notification, StreamTarget, decode_stream_data,
};

use super::WAIT_TIMEOUT;

/// Output collected up to and including the `exit` line.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Transcript {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub status: i32,
}

impl Transcript {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// One connection to the server.
pub struct SessionClient {
    reader: BufReader<UnixStream>,
    writer: UnixStream,
}

impl SessionClient {
    pub fn connect(socket: &Path) -> Result<Self, String> {
        let stream = UnixStream::connect(socket).map_err(|error| error.to_string())?;
        stream
            .set_read_timeout(Some(WAIT_TIMEOUT))
            .map_err(|error| error.to_string())?;
        let writer = stream.try_clone().map_err(|error| error.to_string())?;
        Ok(Self {
            reader: BufReader::new(stream),
            writer,
        })
    }

    /// Runs one command in a one-shot session.
    pub fn run(socket: &Path, command: &str, arguments: &[&str]) -> Result<Transcript, String> {
        let mut client = Self::connect(socket)?;
        client.send(&request(command, arguments))?;
        client.read_reply()
    }

    /// Sends a raw request line.
    pub fn send_line(&mut self, line: &str) -> Result<(), String> {
        self.writer
            .write_all(line.as_bytes())
            .and_then(|()| self.writer.write_all(b"\n"))
            .and_then(|()| self.writer.flush())
            .map_err(|error| error.to_string())
    }

    pub fn send(&mut self, request: &CommandRequest) -> Result<(), String> {
        let line = serde_json::to_string(request).map_err(|error| error.to_string())?;
        self.send_line(&line)
    }

    /// Collects stream chunks until the `exit` line. Notifications arriving
    /// first are skipped.
    pub fn read_reply(&mut self) -> Result<Transcript, String> {
        let mut transcript = Transcript::default();
        loop {
            match self.next_message()? {
                DaemonMessage::Stream {
                    stream,
                    data,
                    encoding,
                } => {
                    let bytes =
                        decode_stream_data(data, encoding).map_err(|error| error.to_string())?;
                    match stream {
                        StreamTarget::Stdout => transcript.stdout.extend(bytes),
                        StreamTarget::Stderr => transcript.stderr.extend(bytes),
                    }
                }
                DaemonMessage::Exit { status } => {
                    transcript.status = status;
                    return Ok(transcript);
                }
                DaemonMessage::Notify { .. } => {}
            }
        }
    }

    /// Waits for the next notification.
    pub fn next_notification(&mut self) -> Result<Notification, String> {
        loop {
            if let DaemonMessage::Notify { event } = self.next_message()? {
                return Ok(event);
            }
        }
    }

    /// Waits for a notification matching `predicate`, skipping others.
    pub fn wait_for<F>(&mut self, predicate: F) -> Result<Notification, String>
    where
        F: Fn(&Notification) -> bool,
    {
        loop {
            let event = self.next_notification()?;
            if predicate(&event) {
                return Ok(event);
            }
        }
    }

    /// True once the server has closed the connection.
    pub fn is_closed(&mut self) -> bool {
        let mut line = String::new();
        matches!(self.reader.read_line(&mut line), Ok(0))
    }

    fn next_message(&mut self) -> Result<DaemonMessage, String> {
        let mut line = String::new();
        let read = self
            .reader
            .read_line(&mut line)
            .map_err(|error| error.to_string())?;
        if read == 0 {
            return Err("server closed the connection".to_owned());
        }
        serde_json::from_str(&line).map_err(|error| format!("{error}: {line}"))
    }
}

pub fn request(command: &str, arguments: &[&str]) -> CommandRequest {
    CommandRequest::new(
        command,
        arguments.iter().copied().map(Argument::from).collect(),
    )
}
