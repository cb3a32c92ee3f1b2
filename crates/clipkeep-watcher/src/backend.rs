//! Clipboard access through the desktop's command-line tools.
//!
//! Wayland sessions use `wl-paste`/`wl-copy`, X11 sessions use `xclip`.
//! Every call runs the tool to completion; a non-zero exit while reading is
//! treated as "nothing there" because both tools fail that way on an empty
//! buffer.

use std::ffi::OsStr;
use std::fmt;
use std::io::Write;
use std::process::{Command, Stdio};

use clap::ValueEnum;
use clipkeep_types::{MimeData, Source};
use tracing::debug;

use crate::error::BackendError;

const LOG_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::backend");

/// Read and write access to the clipboard buffers.
pub trait ClipboardBackend {
    /// Lists the MIME types currently offered on `source`.
    ///
    /// # Errors
    ///
    /// Fails when the tool cannot be run.
    fn formats(&self, source: Source) -> Result<Vec<String>, BackendError>;

    /// Reads one representation, `None` when it is not available.
    ///
    /// # Errors
    ///
    /// Fails when the tool cannot be run.
    fn read(&self, source: Source, mime: &str) -> Result<Option<Vec<u8>>, BackendError>;

    /// Takes ownership of `source` and offers `data` on it.
    ///
    /// # Errors
    ///
    /// Fails when the tool cannot be run or rejects the content.
    fn write(&self, source: Source, data: &MimeData) -> Result<(), BackendError>;

    /// Title of the focused window, when the platform exposes it.
    fn window_title(&self) -> Option<String>;
}

/// Clipboard tool family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Tool {
    /// `wl-paste` and `wl-copy` from wl-clipboard.
    WlClipboard,
    /// `xclip`.
    Xclip,
}

impl Tool {
    /// Picks wl-clipboard inside a Wayland session and xclip otherwise.
    #[must_use]
    pub fn detect() -> Self {
        if std::env::var_os("WAYLAND_DISPLAY").is_some() {
            Self::WlClipboard
        } else {
            Self::Xclip
        }
    }

    const fn reader(self) -> &'static str {
        match self {
            Self::WlClipboard => "wl-paste",
            Self::Xclip => "xclip",
        }
    }

    const fn writer(self) -> &'static str {
        match self {
            Self::WlClipboard => "wl-copy",
            Self::Xclip => "xclip",
        }
    }

    fn list_arguments(self, source: Source) -> Vec<&'static str> {
        match self {
            Self::WlClipboard => with_primary(source, vec!["--list-types"]),
            Self::Xclip => vec!["-selection", selection_name(source), "-o", "-t", "TARGETS"],
        }
    }

    fn read_arguments(self, source: Source, mime: &str) -> Vec<String> {
        let base = match self {
            Self::WlClipboard => with_primary(source, vec!["--no-newline", "--type"]),
            Self::Xclip => vec!["-selection", selection_name(source), "-o", "-t"],
        };
        base.into_iter()
            .map(str::to_owned)
            .chain(std::iter::once(mime.to_owned()))
            .collect()
    }

    fn write_arguments(self, source: Source, mime: &str) -> Vec<String> {
        let base = match self {
            Self::WlClipboard => with_primary(source, vec!["--type"]),
            Self::Xclip => vec!["-selection", selection_name(source), "-i", "-t"],
        };
        base.into_iter()
            .map(str::to_owned)
            .chain(std::iter::once(mime.to_owned()))
            .collect()
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WlClipboard => formatter.write_str("wl-clipboard"),
            Self::Xclip => formatter.write_str("xclip"),
        }
    }
}

fn with_primary(source: Source, mut arguments: Vec<&'static str>) -> Vec<&'static str> {
    if source == Source::Selection {
        arguments.insert(0, "--primary");
    }
    arguments
}

const fn selection_name(source: Source) -> &'static str {
    match source {
        Source::Clipboard => "clipboard",
        Source::Selection => "primary",
    }
}

/// Backend that shells out to the chosen [`Tool`].
#[derive(Debug, Clone, Copy)]
pub struct CommandBackend {
    tool: Tool,
}

impl CommandBackend {
    /// Backend driving `tool`.
    #[must_use]
    pub const fn new(tool: Tool) -> Self {
        Self { tool }
    }

    /// Tool in use.
    #[must_use]
    pub const fn tool(&self) -> Tool {
        self.tool
    }
}

impl ClipboardBackend for CommandBackend {
    fn formats(&self, source: Source) -> Result<Vec<String>, BackendError> {
        let program = self.tool.reader();
        let Some(listing) = capture(program, self.tool.list_arguments(source))? else {
            return Ok(Vec::new());
        };
        Ok(parse_format_listing(&listing))
    }

    fn read(&self, source: Source, mime: &str) -> Result<Option<Vec<u8>>, BackendError> {
        capture(self.tool.reader(), self.tool.read_arguments(source, mime))
    }

    fn write(&self, source: Source, data: &MimeData) -> Result<(), BackendError> {
        // Both tools offer a single representation per invocation; the first
        // format is the preferred one.
        let Some((mime, payload)) = data.iter().next() else {
            return Ok(());
        };
        let program = self.tool.writer();
        let mut child = Command::new(program)
            .args(self.tool.write_arguments(source, mime))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source_error| BackendError::Spawn {
                program,
                source: source_error,
            })?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(payload)
                .map_err(|error| BackendError::Feed {
                    program,
                    source: error,
                })?;
        }
        let status = child.wait().map_err(|error| BackendError::Feed {
            program,
            source: error,
        })?;
        if !status.success() {
            return Err(BackendError::Rejected {
                program,
                status: status.code(),
            });
        }
        debug!(target: LOG_TARGET, %source, mime, bytes = payload.len(), "content set");
        Ok(())
    }

    fn window_title(&self) -> Option<String> {
        if self.tool != Tool::Xclip {
            return None;
        }
        let output = capture("xdotool", ["getactivewindow", "getwindowname"]).ok()??;
        let title = String::from_utf8_lossy(&output).trim().to_owned();
        (!title.is_empty()).then_some(title)
    }
}

/// Runs `program` and returns its stdout, or `None` when it exits non-zero.
fn capture<I, S>(program: &'static str, arguments: I) -> Result<Option<Vec<u8>>, BackendError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = Command::new(program)
        .args(arguments)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .map_err(|source| BackendError::Spawn { program, source })?;
    Ok(output.status.success().then_some(output.stdout))
}

/// Keeps MIME types from a tool's listing. X11 target atoms such as
/// `TARGETS` or `TIMESTAMP` are dropped.
fn parse_format_listing(listing: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(listing)
        .lines()
        .map(str::trim)
        .filter(|line| line.contains('/'))
        .map(str::to_owned)
        .collect()
}
