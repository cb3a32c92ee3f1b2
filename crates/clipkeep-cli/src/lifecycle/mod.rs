//! Lifecycle management for `clipkeepd`.
//!
//! The module is split into focused submodules:
//! - [`types`] holds the handler context and output.
//! - [`error`] captures the error surface exposed to the CLI.
//! - [`spawning`] launches the server binary.
//! - [`monitoring`] reads health snapshots and polls for readiness.
//! - [`shutdown`] signals the server and waits for it to go away.
//! - [`socket`] checks whether a server already answers.
//! - [`controller`] implements the start/stop/status flows.

mod controller;
mod error;
mod monitoring;
mod shutdown;
mod socket;
mod spawning;
mod types;

pub(crate) use controller::SystemLifecycle;
pub(crate) use error::LifecycleError;
pub(crate) use types::{LifecycleContext, LifecycleOutput};
