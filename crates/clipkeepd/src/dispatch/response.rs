//! Response serialization helpers for the session handler.
//!
//! [`ResponseWriter`] frames [`DaemonMessage`] values as JSONL lines. The
//! client reads lines until an `exit` message, or until the connection
//! closes for interactive sessions.

use std::io::Write;

use clipkeep_types::session::{DaemonMessage, Notification, StreamTarget};

use super::errors::DispatchError;
use crate::engine::Reply;

/// Writer that serializes daemon messages to a stream.
pub struct ResponseWriter<W> {
    writer: W,
}

impl<W: Write> ResponseWriter<W> {
    /// Creates a new response writer wrapping the given output stream.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes a daemon message as a JSONL line.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_message(&mut self, message: &DaemonMessage) -> Result<(), DispatchError> {
        serde_json::to_writer(&mut self.writer, message)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    /// Writes the output streams of a reply followed by its exit status.
    /// Empty streams are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_reply(&mut self, reply: Reply) -> Result<(), DispatchError> {
        if !reply.stdout.is_empty() {
            self.write_message(&DaemonMessage::bytes(StreamTarget::Stdout, reply.stdout))?;
        }
        if !reply.stderr.is_empty() {
            self.write_message(&DaemonMessage::bytes(StreamTarget::Stderr, reply.stderr))?;
        }
        self.write_exit(reply.status)
    }

    /// Writes an exit message and flushes the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if writing or flushing fails.
    pub fn write_exit(&mut self, status: i32) -> Result<(), DispatchError> {
        self.write_message(&DaemonMessage::exit(status))?;
        self.writer.flush()?;
        Ok(())
    }

    /// Writes an error message to stderr followed by an exit message with
    /// the error's status code.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_error(&mut self, error: &DispatchError) -> Result<(), DispatchError> {
        self.write_message(&DaemonMessage::text(
            StreamTarget::Stderr,
            format!("error: {error}\n"),
        ))?;
        self.write_exit(error.exit_status())
    }

    /// Writes and flushes one notification line.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails, typically because the client
    /// hung up.
    pub fn write_notification(&mut self, event: Notification) -> Result<(), DispatchError> {
        self.write_message(&DaemonMessage::notify(event))?;
        self.writer.flush()?;
        Ok(())
    }
}
