//! Error types for the watcher worker.

use std::io;

use clipkeep_types::channel::FrameError;
use thiserror::Error;

/// Failures talking to the external clipboard tools.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The tool could not be started at all.
    #[error("failed to run '{program}': {source}")]
    Spawn {
        /// Program that failed to start.
        program: &'static str,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Content could not be handed to the tool.
    #[error("failed to pass content to '{program}': {source}")]
    Feed {
        /// Program that was being fed.
        program: &'static str,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The tool refused to take ownership of the buffer.
    #[error("'{program}' exited with status {status:?} while setting content")]
    Rejected {
        /// Program that failed.
        program: &'static str,
        /// Exit status, when the process was not killed by a signal.
        status: Option<i32>,
    },
}

/// Errors that end the watcher loop.
#[derive(Debug, Error)]
pub enum WatcherError {
    /// The clipboard tools are unusable.
    #[error(transparent)]
    Backend(#[from] BackendError),
    /// Reading from or writing to the server failed.
    #[error("snapshot channel failed: {0}")]
    Channel(#[source] FrameError),
    /// The frame reader thread could not be started.
    #[error("failed to start the frame reader: {0}")]
    SpawnReader(#[source] io::Error),
}
