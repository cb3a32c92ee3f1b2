//! Server bootstrap orchestration.

use std::io;
use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use thiserror::Error;

use clipkeep_config::{Config, SocketPreparationError, StoragePaths, StoragePathsError};

use crate::engine::{Engine, EngineHandle, EngineParts, EngineQueue, Options, OptionsError};
use crate::health::HealthReporter;
use crate::history::HistoryStore;
use crate::rules::{ChainExecutor, RuleSet};
use crate::telemetry::{self, TelemetryError, TelemetryHandle};
use crate::watcher::{WatcherHandle, WatcherLauncher, WatcherState};

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the server configuration.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader returning a configuration resolved earlier.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps an already loaded configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// Socket preparation failed.
    #[error("failed to prepare server socket: {source}")]
    Socket {
        /// Filesystem error reported while preparing the socket directory.
        #[source]
        source: SocketPreparationError,
    },
    /// The data directory could not be prepared.
    #[error("failed to prepare data directory: {source}")]
    Storage {
        /// Underlying storage error.
        #[source]
        source: StoragePathsError,
    },
    /// The options file exists but could not be used.
    #[error("failed to load options: {source}")]
    Options {
        /// Underlying options error.
        #[source]
        source: OptionsError,
    },
    /// The watcher supervisor thread could not be started.
    #[error("failed to start clipboard monitor supervisor: {source}")]
    Watcher {
        /// Underlying spawn error.
        #[source]
        source: io::Error,
    },
    /// The engine threads could not be started.
    #[error("failed to start clipboard engine: {source}")]
    Engine {
        /// Underlying spawn error.
        #[source]
        source: io::Error,
    },
}

/// Collaborators the server core is wired with.
pub struct Collaborators<L> {
    /// Starts watcher processes.
    pub launcher: L,
    /// Runs rule chains, actions and editors.
    pub executor: Arc<dyn ChainExecutor>,
    /// Invoked by the `exit` command.
    pub on_exit: Box<dyn Fn() + Send>,
}

/// Result of a successful bootstrap invocation.
pub struct Server {
    config: Config,
    telemetry: TelemetryHandle,
    watcher: WatcherHandle,
    engine: Engine,
}

impl Server {
    /// Accessor for the resolved configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Accessor for the telemetry handle, primarily useful for testing.
    #[must_use]
    pub fn telemetry(&self) -> &TelemetryHandle {
        &self.telemetry
    }

    /// Client handle for sessions.
    #[must_use]
    pub fn handle(&self) -> EngineHandle {
        self.engine.handle()
    }

    /// Current clipboard monitor state.
    #[must_use]
    pub fn watcher_state(&self) -> WatcherState {
        self.watcher.state()
    }

    /// Stops the watcher, then the engine, which saves unsaved history.
    pub fn shutdown(self) {
        let Self {
            watcher, engine, ..
        } = self;
        watcher.shutdown();
        engine.shutdown();
    }
}

/// Bootstraps the server using the supplied collaborators.
///
/// Rules that fail to load and tabs whose history is unreadable do not stop
/// the server: they are reported, the affected rules are disabled or tabs
/// start empty, and the problems are repeated to every interactive session.
///
/// # Errors
///
/// Fails when configuration, telemetry, storage or options cannot be set
/// up, or when a worker thread cannot be spawned.
pub fn bootstrap_with<L>(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    collaborators: Collaborators<L>,
) -> Result<Server, BootstrapError>
where
    L: WatcherLauncher,
{
    reporter.bootstrap_starting();
    let result = bootstrap_inner(loader, &reporter, collaborators);
    match &result {
        Ok(server) => reporter.bootstrap_succeeded(server.config()),
        Err(error) => reporter.bootstrap_failed(error),
    }
    result
}

fn bootstrap_inner<L>(
    loader: &dyn ConfigLoader,
    reporter: &Arc<dyn HealthReporter>,
    collaborators: Collaborators<L>,
) -> Result<Server, BootstrapError>
where
    L: WatcherLauncher,
{
    let config = loader
        .load()
        .map_err(|source| BootstrapError::Configuration { source })?;
    let telemetry =
        telemetry::initialise(&config).map_err(|source| BootstrapError::Telemetry { source })?;
    config
        .daemon_socket()
        .prepare_filesystem()
        .map_err(|source| BootstrapError::Socket { source })?;
    let storage = StoragePaths::from_config(&config)
        .and_then(|storage| storage.prepare().map(|()| storage))
        .map_err(|source| BootstrapError::Storage { source })?;

    let options = Options::load(storage.options_path())
        .map_err(|source| BootstrapError::Options { source })?;
    let mut warnings = Vec::new();

    let rules = match RuleSet::load(storage.rules_path()) {
        Ok(rules) => rules,
        Err(error) => {
            warnings.push(format!("rules not loaded: {error}"));
            RuleSet::default()
        }
    };
    for problem in rules.problems() {
        reporter.rule_rejected(problem);
        warnings.push(format!(
            "rule {} '{}' disabled: {}",
            problem.index, problem.name, problem.defect
        ));
    }

    let (history, failures) = HistoryStore::load(
        storage.history_dir(),
        options.tabs.iter().cloned(),
        options.maxitems,
    );
    for failure in &failures {
        reporter.history_corrupted(failure);
        warnings.push(format!(
            "history of tab '{}' is unreadable and starts empty: {}",
            failure.tab, failure.error
        ));
    }

    let queue = EngineQueue::new();
    let watcher = WatcherHandle::spawn(
        collaborators.launcher,
        Arc::new(queue.sink()),
        Arc::clone(reporter),
        options.watcher_settings(),
    )
    .map_err(|source| BootstrapError::Watcher { source })?;
    let parts = EngineParts {
        history,
        options,
        options_path: storage.options_path().to_path_buf(),
        rules,
        monitor: Box::new(watcher.link()),
        executor: collaborators.executor,
        on_exit: collaborators.on_exit,
        warnings,
    };
    let engine = Engine::spawn(queue, parts).map_err(|source| BootstrapError::Engine { source })?;

    Ok(Server {
        config,
        telemetry,
        watcher,
        engine,
    })
}
