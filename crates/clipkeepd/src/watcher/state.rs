//! Lifecycle states of the watcher process.

use std::fmt;

/// Where the supervised watcher is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    /// The process is being spawned.
    Starting,
    /// The process is up; settings have not been pushed yet.
    Started,
    /// Settings were pushed; snapshots flow.
    Running,
    /// Shutdown was requested and the process is being stopped.
    Terminating,
    /// The process is gone and its reader has been joined.
    Terminated,
    /// The process failed and a restart is pending.
    Crashed {
        /// Consecutive failures without a valid frame.
        failures: u32,
    },
    /// Too many consecutive failures; no further restarts.
    GaveUp,
}

impl WatcherState {
    /// Lowercase state name used in logs and health events.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Started => "started",
            Self::Running => "running",
            Self::Terminating => "terminating",
            Self::Terminated => "terminated",
            Self::Crashed { .. } => "crashed",
            Self::GaveUp => "gave_up",
        }
    }

    /// True when frames can be sent to the watcher.
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }
}

impl fmt::Display for WatcherState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}
