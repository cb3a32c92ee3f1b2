//! Supervision of the external clipboard watcher process.
//!
//! The watcher is a child process that observes the platform clipboard and
//! speaks the snapshot channel on its standard streams. A dedicated
//! supervisor thread starts it, pushes the monitoring settings, restarts it
//! with exponential backoff when it crashes and gives up after a run of
//! failures without a single valid frame. Snapshots are decoded on a reader
//! thread and handed to a [`SnapshotSink`]; nothing here ever runs on the
//! engine or session threads.

mod launcher;
mod state;
mod supervisor;

use clipkeep_types::{MimeData, Source};

pub use launcher::{CommandLauncher, WatcherLauncher, WatcherProcess};
pub use state::WatcherState;
pub use supervisor::{
    INITIAL_BACKOFF, MAX_BACKOFF, MAX_CONSECUTIVE_FAILURES, MAX_FRAME_FAULTS, TERMINATE_GRACE, WatcherError,
    WatcherHandle, WatcherLink, backoff_delay,
};

pub(crate) const WATCHER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::watcher");

/// One clipboard change reported by the watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Buffer the content came from.
    pub source: Source,
    /// Title of the owning window, when the platform reports one.
    pub window_title: Option<String>,
    /// Captured representations.
    pub data: MimeData,
}

/// Receives what the supervisor observes.
pub trait SnapshotSink: Send + Sync {
    /// Called on the reader thread for every decoded snapshot.
    fn snapshot(&self, snapshot: Snapshot);

    /// Called on the supervisor thread after every state transition.
    fn state_changed(&self, state: &WatcherState);
}
