//! Clipboard history server.
//!
//! `clipkeepd` owns the clipboard history of a desktop session. A supervised
//! watcher process reports clipboard changes as framed snapshots, the rule
//! pipeline decides what happens to each one, and the history store keeps
//! the resulting items in named tabs that survive restarts. Clients talk to
//! the server over a local socket using the JSONL session protocol described
//! in the `dispatch` module.
//!
//! All mutable state lives on a single engine thread. The watcher
//! supervisor, the rule worker and every client session send events to it,
//! so commands and captured snapshots are applied in arrival order.
//!
//! The bootstrap sequence loads configuration, initialises structured
//! telemetry, prepares the data directory, loads options, rules and history,
//! and then starts the watcher and the engine. Health reporting hooks emit
//! structured telemetry at each stage so operators can diagnose failures
//! quickly.

mod bootstrap;
mod dispatch;
pub mod engine;
mod files;
mod health;
pub mod history;
mod process;
pub mod rules;
mod telemetry;
mod transport;
pub mod watcher;

pub use bootstrap::{
    BootstrapError, Collaborators, ConfigLoader, Server, StaticConfigLoader, SystemConfigLoader,
    bootstrap_with,
};
pub use dispatch::DispatchError;
pub use health::{HealthReporter, StructuredHealthReporter};
pub use process::{ALREADY_RUNNING_STATUS, GuardError, LaunchError, LaunchMode, run_daemon};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
