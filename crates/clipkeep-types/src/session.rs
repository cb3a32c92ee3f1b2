//! JSONL envelopes exchanged on the client socket.
//!
//! A client sends one [`CommandRequest`] line. The server answers with
//! [`DaemonMessage`] lines: zero or more `stream` chunks, then an `exit`.
//! Interactive sessions additionally receive `notify` lines until either
//! side hangs up.
//!
//! ```json
//! {"command":"read","arguments":["text/plain","0"],"session":"oneshot"}
//! {"kind":"stream","stream":"stdout","data":"hello"}
//! {"kind":"exit","status":0}
//! ```

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Source;

/// How long a session stays attached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionRole {
    /// One command, one response stream, then the connection closes.
    #[default]
    Oneshot,
    /// The connection subscribes to notifications after its command.
    Interactive,
}

/// A command argument. Binary data travels base64-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Argument {
    /// UTF-8 text.
    Text(String),
    /// Arbitrary bytes.
    Binary {
        /// Standard base64 encoding of the bytes.
        base64: String,
    },
}

/// Error raised when a binary argument is not valid base64.
#[derive(Debug, Error)]
#[error("invalid base64 payload: {0}")]
pub struct PayloadError(#[from] base64::DecodeError);

impl Argument {
    /// Wraps bytes, choosing the text form when they are valid UTF-8.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(text) => Self::Text(text),
            Err(error) => Self::Binary {
                base64: STANDARD.encode(error.into_bytes()),
            },
        }
    }

    /// Returns the raw bytes of the argument.
    ///
    /// # Errors
    ///
    /// Returns an error when a binary argument is not valid base64.
    pub fn into_bytes(self) -> Result<Vec<u8>, PayloadError> {
        match self {
            Self::Text(text) => Ok(text.into_bytes()),
            Self::Binary { base64 } => Ok(STANDARD.decode(base64)?),
        }
    }
}

impl From<&str> for Argument {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Argument {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Request line sent by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequest {
    /// Command verb, for example `read` or `add`.
    pub command: String,
    /// Arguments after escape expansion and stdin substitution.
    #[serde(default)]
    pub arguments: Vec<Argument>,
    /// Session role requested by the client.
    #[serde(default)]
    pub session: SessionRole,
}

impl CommandRequest {
    /// Creates a one-shot request.
    #[must_use]
    pub fn new(command: impl Into<String>, arguments: Vec<Argument>) -> Self {
        Self {
            command: command.into(),
            arguments,
            session: SessionRole::Oneshot,
        }
    }

    /// Switches the request to an interactive session.
    #[must_use]
    pub fn interactive(mut self) -> Self {
        self.session = SessionRole::Interactive;
        self
    }
}

/// Client-side stream a chunk is written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamTarget {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

/// Encoding of a stream chunk's `data` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataEncoding {
    /// Standard base64.
    Base64,
}

/// User interface request broadcast to interactive sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UiRequest {
    /// Show the history window.
    Show,
    /// Hide the history window.
    Hide,
    /// Toggle the history window.
    Toggle,
    /// Open the tray menu.
    Menu,
    /// Open the action dialog.
    ActionDialog,
}

/// Event pushed to interactive sessions after a state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// Items in a tab were added, removed, moved or edited.
    ItemsChanged {
        /// Affected tab.
        tab: String,
        /// Item count after the change.
        count: usize,
    },
    /// Tabs were created, removed or renamed.
    TabsChanged {
        /// Tab names in order.
        tabs: Vec<String>,
    },
    /// The cached clipboard or selection content changed.
    ClipboardChanged {
        /// Buffer that changed.
        source: Source,
        /// Text of the new content, when it has any.
        text: Option<String>,
    },
    /// A user interface request.
    Ui {
        /// What to do.
        request: UiRequest,
        /// Text to prefill, used by the action dialog.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
    /// A timed notification message.
    Popup {
        /// Title line.
        title: String,
        /// Message body.
        message: String,
        /// Display time in milliseconds.
        timeout_ms: u64,
    },
    /// An action waits for confirmation.
    ActionPending {
        /// Action identifier used by `confirm` and `cancel`.
        id: u64,
        /// Rule name, empty for ad-hoc actions.
        name: String,
        /// Fully substituted command line.
        command: String,
    },
    /// An action ended.
    ActionFinished {
        /// Action identifier.
        id: u64,
        /// Human readable outcome.
        outcome: String,
    },
    /// Storing of new snapshots was enabled or disabled.
    MonitoringChanged {
        /// True while snapshots are stored.
        enabled: bool,
    },
    /// A problem users should know about.
    Warning {
        /// Description of the problem.
        message: String,
    },
}

/// Line sent from the server to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DaemonMessage {
    /// Output chunk for the client's stdout or stderr.
    Stream {
        /// Target stream.
        stream: StreamTarget,
        /// Payload, base64-encoded when `encoding` says so.
        data: String,
        /// Payload encoding; absent for UTF-8 text.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        encoding: Option<DataEncoding>,
    },
    /// Final line of a command response.
    Exit {
        /// Exit status (0 for success).
        status: i32,
    },
    /// Event for an interactive session.
    Notify {
        /// The event.
        event: Notification,
    },
}

impl DaemonMessage {
    /// Creates a text chunk for the given stream.
    #[must_use]
    pub fn text(stream: StreamTarget, data: impl Into<String>) -> Self {
        Self::Stream {
            stream,
            data: data.into(),
            encoding: None,
        }
    }

    /// Creates a chunk from raw bytes, base64-encoding them unless they are
    /// valid UTF-8.
    #[must_use]
    pub fn bytes(stream: StreamTarget, data: Vec<u8>) -> Self {
        match String::from_utf8(data) {
            Ok(text) => Self::text(stream, text),
            Err(error) => Self::Stream {
                stream,
                data: STANDARD.encode(error.into_bytes()),
                encoding: Some(DataEncoding::Base64),
            },
        }
    }

    /// Creates an exit line.
    #[must_use]
    pub const fn exit(status: i32) -> Self {
        Self::Exit { status }
    }

    /// Creates a notification line.
    #[must_use]
    pub const fn notify(event: Notification) -> Self {
        Self::Notify { event }
    }
}

/// Decodes the payload of a stream chunk.
///
/// # Errors
///
/// Returns an error when a base64 chunk is malformed.
pub fn decode_stream_data(
    data: String,
    encoding: Option<DataEncoding>,
) -> Result<Vec<u8>, PayloadError> {
    match encoding {
        None => Ok(data.into_bytes()),
        Some(DataEncoding::Base64) => Ok(STANDARD.decode(data)?),
    }
}
