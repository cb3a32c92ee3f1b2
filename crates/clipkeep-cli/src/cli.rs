//! CLI argument definitions for the clipkeep client.
//!
//! Only the client-side subcommands are modelled here. Every other word is
//! captured verbatim as a server command so escape handling and the `--`
//! marker reach [`crate::arguments`] untouched.

use std::ffi::OsString;

use clap::{Parser, Subcommand};

/// Command-line interface for the clipkeep client.
#[derive(Parser, Debug)]
#[command(
    name = "clipkeep",
    about = "Talk to the clipkeep clipboard history server",
    override_usage = "clipkeep [CONFIG OPTIONS] <COMMAND> [ARGUMENTS]...",
    disable_help_subcommand = true,
    disable_version_flag = true
)]
pub(crate) struct Cli {
    /// Client subcommand or server command.
    #[command(subcommand)]
    pub(crate) command: Option<CliCommand>,
}

/// Structured subcommands for the clipkeep client.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub(crate) enum CliCommand {
    /// Runs daemon lifecycle commands.
    Daemon {
        /// The lifecycle action to perform.
        #[command(subcommand)]
        action: DaemonAction,
    },
    /// Attaches an interactive session and prints server notifications as
    /// JSON lines until the server goes away.
    Listen,
    /// Any other word is sent to the server together with its arguments.
    #[command(external_subcommand)]
    Server(Vec<OsString>),
}

/// Daemon lifecycle actions.
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DaemonAction {
    /// Starts the server and waits for readiness.
    Start,
    /// Stops the server gracefully.
    Stop,
    /// Prints server health information.
    Status,
}
