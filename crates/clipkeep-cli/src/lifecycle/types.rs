//! What a lifecycle handler gets besides the action itself.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io::{self, Write};

use clipkeep_config::Config;

use super::LifecycleError;

/// Configuration and launch settings for `clipkeep daemon`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LifecycleContext<'a> {
    pub(crate) config: &'a Config,
    /// Configuration flags given to the client, forwarded to the server.
    pub(crate) config_arguments: &'a [OsString],
    /// Server binary override, otherwise `CLIPKEEPD_BIN` or `clipkeepd`.
    pub(crate) daemon_binary: Option<&'a OsStr>,
}

/// Client stdout and stderr. Every line is flushed so progress shows while
/// `daemon start` waits for the server.
pub(crate) struct LifecycleOutput<W: Write, E: Write> {
    stdout: W,
    stderr: E,
}

impl<W: Write, E: Write> LifecycleOutput<W, E> {
    pub(crate) const fn new(stdout: W, stderr: E) -> Self {
        Self { stdout, stderr }
    }

    pub(crate) fn report(&mut self, args: fmt::Arguments<'_>) -> Result<(), LifecycleError> {
        write_line(&mut self.stdout, args).map_err(LifecycleError::Io)
    }

    pub(crate) fn warn(&mut self, args: fmt::Arguments<'_>) -> Result<(), LifecycleError> {
        write_line(&mut self.stderr, args).map_err(LifecycleError::Io)
    }
}

fn write_line(writer: &mut impl Write, args: fmt::Arguments<'_>) -> io::Result<()> {
    writer.write_fmt(args)?;
    writer.write_all(b"\n")?;
    writer.flush()
}
