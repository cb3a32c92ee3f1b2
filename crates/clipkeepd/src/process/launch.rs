//! Supervises server launch sequencing and runtime orchestration.

use std::env;
use std::sync::Arc;

use tracing::info;

use clipkeep_config::{Config, RuntimePaths};

use crate::bootstrap::{
    Collaborators, ConfigLoader, StaticConfigLoader, SystemConfigLoader, bootstrap_with,
};
use crate::dispatch::SessionHandler;
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::rules::{ChainExecutor, ProcessChainRunner};
use crate::transport::SocketListener;
use crate::watcher::{CommandLauncher, WatcherLauncher};

use super::daemonizer::{Daemonizer, SystemDaemonizer};
use super::errors::LaunchError;
use super::guard::{HealthState, ProcessGuard};
use super::shutdown::{ShutdownSignal, SystemShutdownSignal};
use super::{FOREGROUND_ENV_VAR, PROCESS_TARGET, SHUTDOWN_TIMEOUT};

/// Launch mode for the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    /// Fork into the background and detach from the controlling terminal.
    Background,
    /// Remain attached to the terminal; primarily used for debugging and tests.
    Foreground,
}

impl LaunchMode {
    fn detect() -> Self {
        if env::var_os(FOREGROUND_ENV_VAR).is_some() {
            Self::Foreground
        } else {
            Self::Background
        }
    }
}

/// Process-level collaborators needed to control server lifecycle.
pub(crate) struct ProcessControl<D, S> {
    pub(crate) mode: LaunchMode,
    pub(crate) daemonizer: D,
    pub(crate) shutdown: S,
}

/// Builds the watcher launcher once the configuration is known.
pub(crate) type LauncherFactory<W> = Box<dyn FnOnce(&Config) -> W>;

/// Service dependencies required to construct the server runtime.
pub(crate) struct ServiceDeps<L, W> {
    pub(crate) loader: L,
    pub(crate) reporter: Arc<dyn HealthReporter>,
    pub(crate) launcher: LauncherFactory<W>,
    pub(crate) executor: Arc<dyn ChainExecutor>,
}

/// Collaborators required to launch the server runtime.
pub(crate) struct LaunchPlan<L, D, S, W> {
    pub(crate) process: ProcessControl<D, S>,
    pub(crate) services: ServiceDeps<L, W>,
}

/// Runs the server using the production collaborators.
///
/// # Errors
///
/// Fails when another server is running or any startup step fails.
pub fn run_daemon() -> Result<(), LaunchError> {
    let plan = LaunchPlan {
        process: ProcessControl {
            mode: LaunchMode::detect(),
            daemonizer: SystemDaemonizer::new(),
            shutdown: SystemShutdownSignal::new(SHUTDOWN_TIMEOUT),
        },
        services: ServiceDeps {
            loader: SystemConfigLoader,
            reporter: Arc::new(StructuredHealthReporter::new()),
            launcher: Box::new(|config: &Config| CommandLauncher::new(config.watcher_program())),
            executor: Arc::new(ProcessChainRunner),
        },
    };
    run_daemon_with(plan)
}

/// Runs the server with injected collaborators.
///
/// The guard is taken before anything touches the history, so a second
/// instance leaves the running server's files alone. Shutdown stops the
/// listener first, then the watcher, then the engine, which saves history.
pub(crate) fn run_daemon_with<L, D, S, W>(plan: LaunchPlan<L, D, S, W>) -> Result<(), LaunchError>
where
    L: ConfigLoader,
    D: Daemonizer,
    S: ShutdownSignal,
    W: WatcherLauncher,
{
    let LaunchPlan { process, services } = plan;
    let ProcessControl {
        mode,
        daemonizer,
        shutdown,
    } = process;
    let ServiceDeps {
        loader,
        reporter,
        launcher,
        executor,
    } = services;

    info!(
        target: PROCESS_TARGET,
        ?mode,
        "starting server runtime"
    );
    let config = loader.load()?;
    config.daemon_socket().prepare_filesystem()?;
    let runtime_paths = RuntimePaths::from_config(&config)?;
    let mut guard = ProcessGuard::acquire(runtime_paths)?;
    if matches!(mode, LaunchMode::Background) {
        daemonizer.daemonize(guard.paths())?;
    }
    guard.write_pid(std::process::id())?;
    guard.write_health(HealthState::Starting)?;
    let listener = SocketListener::bind(config.daemon_socket())?;

    let trigger = shutdown.trigger();
    let collaborators = Collaborators {
        launcher: launcher(&config),
        executor,
        on_exit: Box::new(move || trigger()),
    };
    let server = bootstrap_with(&StaticConfigLoader::new(config), reporter, collaborators)?;
    let handler = Arc::new(SessionHandler::new(server.handle()));

    let listener_handle = match listener.start(handler) {
        Ok(handle) => handle,
        Err(error) => {
            server.shutdown();
            return Err(error.into());
        }
    };
    guard.write_health(HealthState::Ready)?;
    let waited = shutdown.wait();
    guard.write_health(HealthState::Stopping)?;
    info!(
        target: PROCESS_TARGET,
        sessions = listener_handle.active_sessions(),
        "stopping listener"
    );
    listener_handle.shutdown();
    let joined = listener_handle.join();
    server.shutdown();
    waited?;
    joined?;
    info!(
        target: PROCESS_TARGET,
        "shutdown sequence completed"
    );
    Ok(())
}
