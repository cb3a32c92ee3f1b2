//! Command-line client runtime for clipkeep.
//!
//! The crate owns argument parsing, configuration bootstrapping, argument
//! preparation, request serialisation and response streaming. Every command
//! that is not a client subcommand is sent to `clipkeepd` as one JSONL
//! request; the server's `stream` chunks are copied to stdout and stderr and
//! its `exit` status becomes the process exit status.
//!
//! `clipkeep listen` attaches an interactive session and prints each server
//! notification as a JSON line. `clipkeep daemon start|stop|status` manage
//! the server process through its runtime files.
//!
//! The runtime is exercised both from the binary entrypoint and from tests
//! where configuration loading and IO streams are substituted.

use std::ffi::{OsStr, OsString};
use std::io::{BufRead, BufReader, Read, Write};
use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use clipkeep_config::Config;
use clipkeep_types::session::{CommandRequest, DaemonMessage, StreamTarget, decode_stream_data};

mod arguments;
mod cli;
mod command;
mod config;
mod errors;
mod lifecycle;
mod transport;

use cli::{Cli, CliCommand, DaemonAction};
use command::{CommandInvocation, write_jsonl};
use config::{ConfigArgumentSplit, split_config_arguments};
pub(crate) use config::{ConfigLoader, OrthoConfigLoader};
pub(crate) use errors::AppError;
use lifecycle::{LifecycleContext, LifecycleError, LifecycleOutput, SystemLifecycle};
use transport::connect;

/// CLI flags recognised by the configuration loader.
///
/// MAINTENANCE: keep in sync with the fields of `clipkeep_config::Config`.
const CONFIG_CLI_FLAGS: &[&str] = &[
    "--config-path",
    "--daemon-socket",
    "--log-filter",
    "--log-format",
    "--data-dir",
    "--watcher-program",
];
const EMPTY_LINE_LIMIT: usize = 10;
/// Command sent by `clipkeep listen` to open the interactive session.
const LISTEN_COMMAND: &str = "monitoring";

/// Bundles the IO streams provided to the CLI runtime.
pub(crate) struct IoStreams<'a, R: Read, W: Write, E: Write> {
    pub(crate) stdin: &'a mut R,
    pub(crate) stdout: &'a mut W,
    pub(crate) stderr: &'a mut E,
}

impl<'a, R: Read, W: Write, E: Write> IoStreams<'a, R, W, E> {
    pub(crate) const fn new(stdin: &'a mut R, stdout: &'a mut W, stderr: &'a mut E) -> Self {
        Self {
            stdin,
            stdout,
            stderr,
        }
    }
}

struct CliRunner<'a, 'b, R: Read, W: Write, E: Write, L: ConfigLoader> {
    io: &'a mut IoStreams<'b, R, W, E>,
    loader: &'a L,
    daemon_binary: Option<&'a OsStr>,
}

impl<'a, 'b, R, W, E, L> CliRunner<'a, 'b, R, W, E, L>
where
    R: Read,
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    const fn new(io: &'a mut IoStreams<'b, R, W, E>, loader: &'a L) -> Self {
        Self {
            io,
            loader,
            daemon_binary: None,
        }
    }

    #[cfg(test)]
    const fn with_daemon_binary(mut self, daemon_binary: Option<&'a OsStr>) -> Self {
        self.daemon_binary = daemon_binary;
        self
    }

    fn run<I>(&mut self, args: I) -> ExitCode
    where
        I: IntoIterator<Item = OsString>,
    {
        let mut lifecycle = SystemLifecycle;
        self.run_with_handler(args, |action, context, output| {
            lifecycle.handle(action, context, output)
        })
    }

    fn run_with_handler<I, F>(&mut self, args: I, handler: F) -> ExitCode
    where
        I: IntoIterator<Item = OsString>,
        F: FnMut(
            DaemonAction,
            LifecycleContext<'_>,
            &mut LifecycleOutput<&mut W, &mut E>,
        ) -> Result<ExitCode, LifecycleError>,
    {
        let args: Vec<OsString> = args.into_iter().collect();
        let split = split_config_arguments(&args);
        let cli_arguments = prepare_cli_arguments(&args, &split);

        match self.execute(cli_arguments, &split, handler) {
            Ok(exit_code) => exit_code,
            Err(error) => {
                let _ignored = writeln!(self.io.stderr, "{error}");
                ExitCode::from(error.exit_status())
            }
        }
    }

    fn execute<F>(
        &mut self,
        cli_arguments: Vec<OsString>,
        split: &ConfigArgumentSplit,
        mut handler: F,
    ) -> Result<ExitCode, AppError>
    where
        F: FnMut(
            DaemonAction,
            LifecycleContext<'_>,
            &mut LifecycleOutput<&mut W, &mut E>,
        ) -> Result<ExitCode, LifecycleError>,
    {
        let cli = match Cli::try_parse_from(cli_arguments) {
            Ok(cli) => cli,
            // `--help` arrives as an error that belongs on stdout.
            Err(error) if !error.use_stderr() => {
                write!(self.io.stdout, "{error}").map_err(AppError::ForwardResponse)?;
                return Ok(ExitCode::SUCCESS);
            }
            Err(error) => return Err(AppError::CliUsage(error)),
        };
        let Some(command) = cli.command else {
            return self.write_bare_usage();
        };

        let config = self.loader.load(&split.config_arguments)?;
        let context = LifecycleContext {
            config: &config,
            config_arguments: &split.config_arguments,
            daemon_binary: self.daemon_binary,
        };
        match command {
            CliCommand::Daemon { action } => {
                let mut output = LifecycleOutput::new(&mut *self.io.stdout, &mut *self.io.stderr);
                handler(action, context, &mut output).map_err(AppError::from)
            }
            CliCommand::Listen => listen(&config, &mut *self.io.stdout, &mut *self.io.stderr),
            CliCommand::Server(words) => {
                let invocation = CommandInvocation::from_words(&words, &mut *self.io.stdin)?;
                execute_daemon_command(
                    &invocation.request,
                    &config,
                    &mut *self.io.stdout,
                    &mut *self.io.stderr,
                )
            }
        }
    }

    fn write_bare_usage(&mut self) -> Result<ExitCode, AppError> {
        let usage = Cli::command().render_usage();
        writeln!(self.io.stderr, "{usage}").map_err(AppError::ForwardResponse)?;
        writeln!(
            self.io.stderr,
            "Run 'clipkeep help' for server commands or 'clipkeep --help' for client options."
        )
        .map_err(AppError::ForwardResponse)?;
        Ok(ExitCode::FAILURE)
    }
}

/// Runs the CLI using the provided arguments and IO handles.
#[must_use]
pub fn run<I, R, W, E>(args: I, stdin: &mut R, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    R: Read,
    W: Write,
    E: Write,
{
    let mut io = IoStreams::new(stdin, stdout, stderr);
    run_with_loader(args, &mut io, &OrthoConfigLoader)
}

/// Runs the CLI with a custom configuration loader.
pub(crate) fn run_with_loader<I, R, W, E, L>(
    args: I,
    io: &mut IoStreams<'_, R, W, E>,
    loader: &L,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    R: Read,
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    CliRunner::new(io, loader).run(args)
}

#[cfg(test)]
pub(crate) fn run_with_daemon_binary<I, R, W, E, L, F>(
    args: I,
    io: &mut IoStreams<'_, R, W, E>,
    loader: &L,
    daemon_binary: Option<&OsStr>,
    handler: F,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    R: Read,
    W: Write,
    E: Write,
    L: ConfigLoader,
    F: FnMut(
        DaemonAction,
        LifecycleContext<'_>,
        &mut LifecycleOutput<&mut W, &mut E>,
    ) -> Result<ExitCode, LifecycleError>,
{
    CliRunner::new(io, loader)
        .with_daemon_binary(daemon_binary)
        .run_with_handler(args, handler)
}

fn prepare_cli_arguments(args: &[OsString], split: &ConfigArgumentSplit) -> Vec<OsString> {
    args.iter()
        .take(1)
        .chain(args.iter().skip(split.command_start.max(1)))
        .cloned()
        .collect()
}

fn execute_daemon_command<W, E>(
    request: &CommandRequest,
    config: &Config,
    stdout: &mut W,
    stderr: &mut E,
) -> Result<ExitCode, AppError>
where
    W: Write,
    E: Write,
{
    let mut connection = connect(config.daemon_socket())?;
    write_jsonl(request, &mut connection)?;
    let status = read_daemon_messages(&mut connection, stdout, stderr)?;
    Ok(exit_code_from_status(status))
}

/// Copies `stream` chunks to the client's streams until the `exit` line.
fn read_daemon_messages<C, W, E>(
    connection: &mut C,
    stdout: &mut W,
    stderr: &mut E,
) -> Result<i32, AppError>
where
    C: Read,
    W: Write,
    E: Write,
{
    let mut reader = BufReader::new(connection);
    let mut line = String::new();
    let mut consecutive_empty_lines = 0;
    let mut exit_status = None;

    while reader
        .read_line(&mut line)
        .map_err(AppError::ReadResponse)?
        != 0
    {
        if line.trim().is_empty() {
            consecutive_empty_lines += 1;
            if consecutive_empty_lines >= EMPTY_LINE_LIMIT {
                writeln!(
                    stderr,
                    "warning: received {EMPTY_LINE_LIMIT} consecutive empty lines from clipkeepd; aborting"
                )
                .map_err(AppError::ForwardResponse)?;
                break;
            }
            line.clear();
            continue;
        }
        consecutive_empty_lines = 0;
        let message: DaemonMessage = serde_json::from_str(&line).map_err(AppError::ParseMessage)?;
        match message {
            DaemonMessage::Stream {
                stream,
                data,
                encoding,
            } => {
                let payload = decode_stream_data(data, encoding).map_err(AppError::DecodeStream)?;
                match stream {
                    StreamTarget::Stdout => stdout.write_all(&payload),
                    StreamTarget::Stderr => stderr.write_all(&payload),
                }
                .map_err(AppError::ForwardResponse)?;
            }
            DaemonMessage::Exit { status } => {
                exit_status = Some(status);
                break;
            }
            DaemonMessage::Notify { .. } => {}
        }
        line.clear();
    }

    stdout.flush().map_err(AppError::ForwardResponse)?;
    stderr.flush().map_err(AppError::ForwardResponse)?;
    exit_status.ok_or(AppError::ConnectionLost)
}

/// Attaches an interactive session and prints notifications until the
/// server closes the connection.
fn listen<W, E>(config: &Config, stdout: &mut W, stderr: &mut E) -> Result<ExitCode, AppError>
where
    W: Write,
    E: Write,
{
    let mut connection = connect(config.daemon_socket())?;
    let request = CommandRequest::new(LISTEN_COMMAND, Vec::new()).interactive();
    write_jsonl(&request, &mut connection)?;

    for line in BufReader::new(connection).lines() {
        let line = line.map_err(AppError::ReadResponse)?;
        if line.trim().is_empty() {
            continue;
        }
        let message: DaemonMessage = serde_json::from_str(&line).map_err(AppError::ParseMessage)?;
        match message {
            DaemonMessage::Notify { event } => {
                serde_json::to_writer(&mut *stdout, &event).map_err(AppError::RenderEvent)?;
                stdout
                    .write_all(b"\n")
                    .and_then(|()| stdout.flush())
                    .map_err(AppError::ForwardResponse)?;
            }
            DaemonMessage::Exit { status } if status != 0 => {
                return Ok(exit_code_from_status(status));
            }
            DaemonMessage::Stream {
                stream: StreamTarget::Stderr,
                data,
                encoding,
            } => {
                let payload = decode_stream_data(data, encoding).map_err(AppError::DecodeStream)?;
                stderr
                    .write_all(&payload)
                    .map_err(AppError::ForwardResponse)?;
            }
            // Output of the attaching command itself.
            DaemonMessage::Stream { .. } | DaemonMessage::Exit { .. } => {}
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn exit_code_from_status(status: i32) -> ExitCode {
    u8::try_from(status).map_or(ExitCode::FAILURE, ExitCode::from)
}

#[cfg(test)]
mod tests;
