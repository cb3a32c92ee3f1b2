//! High-level orchestration for server lifecycle commands.

use std::io::Write;
use std::process::ExitCode;
use std::time::{Duration, SystemTime};

use clipkeep_config::RuntimePaths;

use super::error::LifecycleError;
use super::monitoring::{HealthSnapshot, read_health, read_pid, wait_for_ready};
use super::shutdown::{signal_daemon, wait_for_shutdown};
use super::socket::{ensure_socket_available, server_answers};
use super::spawning::spawn_daemon;
use super::types::{LifecycleContext, LifecycleOutput};
use crate::cli::DaemonAction;

const STARTUP_TIMEOUT: Duration = Duration::from_secs(10);
const NOT_RUNNING: &str = "clipkeepd is not running; use 'clipkeep daemon start' to launch it.";

/// Production lifecycle controller.
#[derive(Debug, Default)]
pub(crate) struct SystemLifecycle;

impl SystemLifecycle {
    pub(crate) fn handle<W: Write, E: Write>(
        &mut self,
        action: DaemonAction,
        context: LifecycleContext<'_>,
        output: &mut LifecycleOutput<W, E>,
    ) -> Result<ExitCode, LifecycleError> {
        match action {
            DaemonAction::Start => Self::start(context, output),
            DaemonAction::Stop => Self::stop(context, output),
            DaemonAction::Status => Self::status(context, output),
        }
    }

    fn start<W: Write, E: Write>(
        context: LifecycleContext<'_>,
        output: &mut LifecycleOutput<W, E>,
    ) -> Result<ExitCode, LifecycleError> {
        ensure_socket_available(context.config.daemon_socket())?;
        let paths = prepare_runtime(context)?;
        let mut child = spawn_daemon(context.config_arguments, context.daemon_binary)?;
        let started_at = SystemTime::now();
        let snapshot = wait_for_ready(&paths, &mut child, started_at, STARTUP_TIMEOUT)?;
        write_startup_banner(output, context, &snapshot, &paths)?;
        Ok(ExitCode::SUCCESS)
    }

    fn stop<W: Write, E: Write>(
        context: LifecycleContext<'_>,
        output: &mut LifecycleOutput<W, E>,
    ) -> Result<ExitCode, LifecycleError> {
        let paths = prepare_runtime(context)?;
        let Some(pid) = read_pid(paths.pid_path())? else {
            if server_answers(context.config.daemon_socket())? {
                return Err(LifecycleError::MissingPidWithSocket {
                    path: paths.pid_path().to_path_buf(),
                    endpoint: context.config.daemon_socket().to_string(),
                });
            }
            output.report(format_args!(
                "clipkeepd is not running (pid file missing at {})",
                paths.pid_path().display()
            ))?;
            return Ok(ExitCode::SUCCESS);
        };
        signal_daemon(pid)?;
        wait_for_shutdown(&paths, context.config.daemon_socket())?;
        output.report(format_args!("clipkeepd pid {pid} stopped cleanly"))?;
        Ok(ExitCode::SUCCESS)
    }

    fn status<W: Write, E: Write>(
        context: LifecycleContext<'_>,
        output: &mut LifecycleOutput<W, E>,
    ) -> Result<ExitCode, LifecycleError> {
        let paths = RuntimePaths::locate(context.config)?;
        if !paths.runtime_dir().exists() {
            output.report(format_args!("{NOT_RUNNING}"))?;
            return Ok(ExitCode::SUCCESS);
        }
        if let Some(snapshot) = read_health(paths.health_path())? {
            output.report(format_args!(
                "clipkeepd status: {} (pid {}) via {}",
                snapshot.status,
                snapshot.pid,
                context.config.daemon_socket()
            ))?;
            return Ok(ExitCode::SUCCESS);
        }
        let reachable = server_answers(context.config.daemon_socket())?;
        match read_pid(paths.pid_path())? {
            Some(pid) => output.report(format_args!(
                "clipkeepd recorded pid {pid} but health snapshot is missing; check {}",
                paths.health_path().display()
            ))?,
            None if reachable => output.report(format_args!(
                "server socket {} is listening but runtime files are missing; consider 'clipkeep daemon stop' or removing {}",
                context.config.daemon_socket(),
                paths.runtime_dir().display()
            ))?,
            None => output.report(format_args!("{NOT_RUNNING}"))?,
        }
        Ok(ExitCode::SUCCESS)
    }
}

fn prepare_runtime(context: LifecycleContext<'_>) -> Result<RuntimePaths, LifecycleError> {
    context.config.daemon_socket().prepare_filesystem()?;
    RuntimePaths::from_config(context.config).map_err(LifecycleError::from)
}

fn write_startup_banner<W: Write, E: Write>(
    output: &mut LifecycleOutput<W, E>,
    context: LifecycleContext<'_>,
    snapshot: &HealthSnapshot,
    paths: &RuntimePaths,
) -> Result<(), LifecycleError> {
    output.report(format_args!(
        "clipkeepd ready (pid {}) on {}",
        snapshot.pid,
        context.config.daemon_socket()
    ))?;
    output.warn(format_args!(
        "runtime files stored under {}",
        paths.runtime_dir().display()
    ))
}
