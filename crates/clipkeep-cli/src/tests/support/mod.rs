//! Test support for clipkeep client coverage.
//!
//! Supplies the behavioural world, a fake server and lifecycle doubles so
//! step definitions and unit tests stay focused on their assertions.

mod fake_daemon;
mod lifecycle;

use std::cell::RefCell;
use std::ffi::OsString;
use std::io::Cursor;
use std::process::ExitCode;

use clipkeep_config::{Config, SocketEndpoint};
use clipkeep_types::session::{CommandRequest, DaemonMessage, StreamTarget};
use rstest::fixture;

use crate::{AppError, ConfigLoader, IoStreams, run_with_daemon_binary};

pub(in crate::tests) use fake_daemon::{FakeDaemon, message_lines};
pub(in crate::tests) use lifecycle::TestLifecycle;
pub(crate) use lifecycle::{temp_paths, write_health_snapshot};

pub(in crate::tests) type StepResult = Result<(), String>;

/// Returns a fixed configuration regardless of the arguments.
pub(in crate::tests) struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self, _args: &[OsString]) -> Result<Config, AppError> {
        Ok(self.config.clone())
    }
}

/// Behavioural world: configuration, fake server and captured output.
#[derive(Default)]
pub(in crate::tests) struct TestWorld {
    pub config: Config,
    pub daemon: Option<FakeDaemon>,
    pub stdin: Vec<u8>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: Option<ExitCode>,
    pub requests: Vec<String>,
    pub lifecycle: TestLifecycle,
    pub daemon_binary: Option<OsString>,
}

impl TestWorld {
    pub fn start_daemon(&mut self, messages: &[DaemonMessage]) -> StepResult {
        let daemon = FakeDaemon::spawn(message_lines(messages))?;
        self.config.daemon_socket = SocketEndpoint::tcp("127.0.0.1", daemon.port());
        self.daemon = Some(daemon);
        Ok(())
    }

    pub fn start_daemon_with_lines(&mut self, lines: Vec<String>) -> StepResult {
        let daemon = FakeDaemon::spawn(lines)?;
        self.config.daemon_socket = SocketEndpoint::tcp("127.0.0.1", daemon.port());
        self.daemon = Some(daemon);
        Ok(())
    }

    /// Points the configuration at a port nothing listens on.
    pub fn point_at_absent_server(&mut self) -> StepResult {
        let listener = std::net::TcpListener::bind(("127.0.0.1", 0))
            .map_err(|error| format!("bind: {error}"))?;
        let port = listener
            .local_addr()
            .map_err(|error| format!("local addr: {error}"))?
            .port();
        drop(listener);
        self.config.daemon_socket = SocketEndpoint::tcp("127.0.0.1", port);
        Ok(())
    }

    /// Runs the CLI with whitespace-separated words after the program name.
    pub fn run(&mut self, command: &str) -> StepResult {
        self.stdout.clear();
        self.stderr.clear();
        self.requests.clear();
        let args = build_args(command);
        let loader = StaticConfigLoader::new(self.config.clone());
        let mut stdin = Cursor::new(self.stdin.clone());
        let daemon_binary = self.daemon_binary.clone();
        let lifecycle = &self.lifecycle;
        let mut io = IoStreams::new(&mut stdin, &mut self.stdout, &mut self.stderr);
        let exit = run_with_daemon_binary(
            args,
            &mut io,
            &loader,
            daemon_binary.as_deref(),
            |action, context, output| lifecycle.handle(action, context, output),
        );
        self.exit_code = Some(exit);
        if let Some(mut daemon) = self.daemon.take() {
            self.requests = daemon.take_requests()?;
        }
        Ok(())
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Parses the single request line the fake server received.
    pub fn request(&self) -> Result<CommandRequest, String> {
        match self.requests.as_slice() {
            [line] => serde_json::from_str(line).map_err(|error| format!("parse request: {error}")),
            other => Err(format!("expected one request, found {other:?}")),
        }
    }

    pub fn assert_exit_code(&self, expected: u8) -> StepResult {
        let exit = self.exit_code.ok_or("no exit code recorded")?;
        if exit == ExitCode::from(expected) {
            Ok(())
        } else {
            Err(format!("expected exit code {expected}, got {exit:?}"))
        }
    }
}

fn build_args(command: &str) -> Vec<OsString> {
    std::iter::once(OsString::from("clipkeep"))
        .chain(
            command
                .trim()
                .trim_matches('"')
                .split_whitespace()
                .map(OsString::from),
        )
        .collect()
}

/// Text chunk followed by an exit line.
pub(in crate::tests) fn reply(stdout: &str, status: i32) -> Vec<DaemonMessage> {
    vec![
        DaemonMessage::text(StreamTarget::Stdout, stdout),
        DaemonMessage::exit(status),
    ]
}

#[fixture]
pub(in crate::tests) fn world() -> RefCell<TestWorld> {
    RefCell::new(TestWorld::default())
}
