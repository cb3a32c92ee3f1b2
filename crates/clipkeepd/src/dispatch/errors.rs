//! Error types for request parsing and command execution.
//!
//! Every failure a client can observe is a [`DispatchError`]. Each variant
//! maps to an exit status: protocol and usage faults return 1,
//! infrastructure faults return 2.

use std::io;
use std::path::PathBuf;

use clipkeep_types::session::PayloadError;
use thiserror::Error;

use crate::engine::OptionsError;
use crate::history::HistoryError;
use crate::watcher::WatcherError;

/// Errors surfaced during request parsing and dispatch.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Request line could not be parsed as valid JSON.
    #[error("malformed JSONL: {message}")]
    MalformedJsonl {
        /// Parser message.
        message: String,
        /// Parser error, when there is one.
        #[source]
        source: Option<serde_json::Error>,
    },

    /// Request JSON structure does not describe a usable command.
    #[error("invalid request structure: {message}")]
    InvalidStructure {
        /// What is wrong.
        message: String,
    },

    /// A binary argument was not valid base64.
    #[error(transparent)]
    InvalidPayload(#[from] PayloadError),

    /// Request exceeds the maximum allowed size.
    #[error("request too large: {size} bytes exceeds {max_size} byte limit")]
    RequestTooLarge {
        /// Bytes read so far.
        size: usize,
        /// Limit.
        max_size: usize,
    },

    /// The command verb is not known.
    #[error("unknown command '{command}'")]
    UnknownCommand {
        /// Requested verb.
        command: String,
    },

    /// Wrong number or shape of arguments.
    #[error("invalid arguments: {message}")]
    InvalidArguments {
        /// Usage hint.
        message: String,
    },

    /// A `config` name or value was rejected.
    #[error("invalid configuration option '{name}': {message}")]
    InvalidOption {
        /// Option name.
        name: String,
        /// Why it was rejected.
        message: String,
    },

    /// No pending or running action carries the identifier.
    #[error("action {id} not found")]
    ActionNotFound {
        /// Requested identifier.
        id: u64,
    },

    /// No rule carries the name.
    #[error("rule '{name}' not found")]
    RuleNotFound {
        /// Requested name.
        name: String,
    },

    /// A history operation failed.
    #[error(transparent)]
    History(#[from] HistoryError),

    /// The clipboard monitor cannot take the request.
    #[error(transparent)]
    MonitorUnavailable(#[from] WatcherError),

    /// The options file could not be written.
    #[error(transparent)]
    Options(#[from] OptionsError),

    /// A file named by the client could not be opened.
    #[error("failed to open '{path}': {source}")]
    FileOpen {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The engine thread is gone.
    #[error("clipboard engine is not available")]
    EngineUnavailable,

    /// IO error during read or write.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Response serialization failed.
    #[error("failed to serialize response: {0}")]
    SerializeResponse(#[from] serde_json::Error),
}

impl DispatchError {
    /// Returns the exit status code for this error.
    ///
    /// Protocol violations and argument errors return status 1. Infrastructure
    /// failures (IO, persistence, monitor, engine) return status 2.
    #[must_use]
    pub const fn exit_status(&self) -> i32 {
        match self {
            Self::MalformedJsonl { .. }
            | Self::InvalidStructure { .. }
            | Self::InvalidPayload(_)
            | Self::RequestTooLarge { .. }
            | Self::UnknownCommand { .. }
            | Self::InvalidArguments { .. }
            | Self::InvalidOption { .. }
            | Self::ActionNotFound { .. }
            | Self::RuleNotFound { .. } => 1,
            Self::History(error) => match error {
                HistoryError::Io { .. } | HistoryError::Corrupted { .. } => 2,
                _ => 1,
            },
            Self::MonitorUnavailable(_)
            | Self::Options(_)
            | Self::FileOpen { .. }
            | Self::EngineUnavailable
            | Self::Io(_)
            | Self::SerializeResponse(_) => 2,
        }
    }

    /// Creates a malformed JSONL error from a serde error.
    #[must_use]
    pub fn from_json_error(source: serde_json::Error) -> Self {
        Self::MalformedJsonl {
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Creates a malformed JSONL error with a custom message.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedJsonl {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }

    /// Creates a request too large error.
    #[must_use]
    pub const fn request_too_large(size: usize, max_size: usize) -> Self {
        Self::RequestTooLarge { size, max_size }
    }

    /// Creates an unknown command error.
    pub fn unknown_command(command: impl Into<String>) -> Self {
        Self::UnknownCommand {
            command: command.into(),
        }
    }

    /// Creates an invalid arguments error.
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            message: message.into(),
        }
    }

    /// Creates an invalid option error.
    pub fn invalid_option(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidOption {
            name: name.into(),
            message: message.into(),
        }
    }
}
