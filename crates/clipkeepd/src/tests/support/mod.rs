//! Test harness utilities shared by the behavioural suites.

mod client;
mod config_loader;
mod process;
mod reporter;
mod server;
mod watcher;

pub use client::{SessionClient, Transcript, request};
pub use config_loader::{FailingConfigLoader, TestConfigLoader};
pub use process::{TestDaemonizer, TestShutdownSignal};
pub use reporter::{HealthEvent, RecordingHealthReporter};
pub use server::ServerWorld;
pub use watcher::{PipeLauncher, WatcherEnd, next_watcher};

use std::time::Duration;

pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);
pub const POLL_INTERVAL: Duration = Duration::from_millis(25);
