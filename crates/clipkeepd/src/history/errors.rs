//! Failures raised by the history store.

use std::io;
use std::path::PathBuf;

use clipkeep_types::records::RecordError;
use thiserror::Error;

/// Errors surfaced by history operations and persistence.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// A tab name was empty.
    #[error("tab name must not be empty")]
    EmptyName,
    /// A tab with the requested name already exists.
    #[error("tab '{name}' already exists")]
    DuplicateName {
        /// Conflicting name.
        name: String,
    },
    /// No tab carries the requested name.
    #[error("tab '{name}' not found")]
    TabNotFound {
        /// Requested name.
        name: String,
    },
    /// A row index fell outside the tab.
    #[error("row {row} is out of range for a tab holding {len} items")]
    RowOutOfRange {
        /// Requested row.
        row: i64,
        /// Number of items in the tab.
        len: usize,
    },
    /// The only remaining tab cannot be removed.
    #[error("cannot remove '{name}', the last tab")]
    LastTab {
        /// Name of the last tab.
        name: String,
    },
    /// Reading or writing a history file failed.
    #[error("failed to access history file '{path}': {source}")]
    Io {
        /// File being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// A history file failed its integrity check.
    #[error("history file '{path}' is corrupted: {source}")]
    Corrupted {
        /// Offending file.
        path: PathBuf,
        /// Decoder failure.
        #[source]
        source: RecordError,
    },
}

impl HistoryError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn tab_not_found(name: &str) -> Self {
        Self::TabNotFound {
            name: name.to_owned(),
        }
    }
}
