//! Scenario world running a complete server on a background thread.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use clipkeep_config::Config;
use serde_json::Value;

use crate::health::HealthReporter;
use crate::process::launch::{LaunchPlan, ProcessControl, ServiceDeps, run_daemon_with};
use crate::process::{LaunchError, LaunchMode};
use crate::rules::ProcessChainRunner;

use super::{
    POLL_INTERVAL, PipeLauncher, RecordingHealthReporter, SessionClient, TestConfigLoader,
    TestDaemonizer, TestShutdownSignal, Transcript, WAIT_TIMEOUT, WatcherEnd, next_watcher,
};

pub struct ServerWorld {
    pub loader: TestConfigLoader,
    pub reporter: Arc<RecordingHealthReporter>,
    pub daemonizer: TestDaemonizer,
    shutdown: TestShutdownSignal,
    launcher: PipeLauncher,
    launched: Receiver<WatcherEnd>,
    watcher: Option<WatcherEnd>,
    handle: Option<JoinHandle<Result<(), LaunchError>>>,
    result: Option<Result<(), LaunchError>>,
    second_start: Option<Result<(), LaunchError>>,
}

impl ServerWorld {
    pub fn new() -> Self {
        let (launcher, launched) = PipeLauncher::new();
        Self {
            loader: TestConfigLoader::new(),
            reporter: Arc::new(RecordingHealthReporter::default()),
            daemonizer: TestDaemonizer::default(),
            shutdown: TestShutdownSignal::new(),
            launcher,
            launched,
            watcher: None,
            handle: None,
            result: None,
            second_start: None,
        }
    }

    fn plan(
        &self,
        mode: LaunchMode,
        shutdown: TestShutdownSignal,
    ) -> LaunchPlan<TestConfigLoader, TestDaemonizer, TestShutdownSignal, PipeLauncher> {
        let launcher = self.launcher.clone();
        LaunchPlan {
            process: ProcessControl {
                mode,
                daemonizer: self.daemonizer.clone(),
                shutdown,
            },
            services: ServiceDeps {
                loader: self.loader.clone(),
                reporter: Arc::clone(&self.reporter) as Arc<dyn HealthReporter>,
                launcher: Box::new(move |_: &Config| launcher),
                executor: Arc::new(ProcessChainRunner),
            },
        }
    }

    /// Starts the server and waits until it reports ready.
    pub fn start(&mut self, mode: LaunchMode) -> Result<(), String> {
        if self.handle.is_some() {
            return Err("server already running".to_owned());
        }
        let loader = self.loader.clone();
        let reporter = Arc::clone(&self.reporter);
        let daemonizer = self.daemonizer.clone();
        let shutdown = self.shutdown.clone();
        let launcher = self.launcher.clone();
        self.handle = Some(thread::spawn(move || {
            run_daemon_with(LaunchPlan {
                process: ProcessControl {
                    mode,
                    daemonizer,
                    shutdown,
                },
                services: ServiceDeps {
                    loader,
                    reporter: reporter as Arc<dyn HealthReporter>,
                    launcher: Box::new(move |_: &Config| launcher),
                    executor: Arc::new(ProcessChainRunner),
                },
            })
        }));
        self.wait_for_ready()
    }

    /// Runs a second server in the foreground on the calling thread. The
    /// shutdown signal is released up front so a successful start returns.
    pub fn start_again(&mut self) {
        let shutdown = TestShutdownSignal::new();
        shutdown.fire();
        let plan = self.plan(LaunchMode::Foreground, shutdown);
        self.second_start = Some(run_daemon_with(plan));
    }

    pub fn second_start(&self) -> Option<&Result<(), LaunchError>> {
        self.second_start.as_ref()
    }

    fn wait_for_ready(&mut self) -> Result<(), String> {
        let deadline = Instant::now() + WAIT_TIMEOUT;
        while Instant::now() < deadline {
            if self.health_status().as_deref() == Some("ready") {
                return Ok(());
            }
            if self.handle.as_ref().is_some_and(JoinHandle::is_finished) {
                self.join()?;
                return Err(format!("server stopped during startup: {:?}", self.result));
            }
            thread::sleep(POLL_INTERVAL);
        }
        Err("server did not publish a ready health snapshot".to_owned())
    }

    /// Releases the shutdown signal and waits for the server thread.
    pub fn stop(&mut self) -> Result<(), String> {
        self.shutdown.fire();
        self.join()
    }

    /// Waits for the server thread to finish on its own.
    pub fn join(&mut self) -> Result<(), String> {
        let handle = self
            .handle
            .take()
            .ok_or_else(|| "server not running".to_owned())?;
        let result = handle
            .join()
            .map_err(|_| "server thread panicked".to_owned())?;
        self.result = Some(result);
        Ok(())
    }

    pub fn result(&self) -> Option<&Result<(), LaunchError>> {
        self.result.as_ref()
    }

    pub fn socket_path(&self) -> PathBuf {
        self.loader.socket_path()
    }

    pub fn lock_path(&self) -> PathBuf {
        self.loader.runtime_dir().join("clipkeepd.lock")
    }

    pub fn pid_path(&self) -> PathBuf {
        self.loader.runtime_dir().join("clipkeepd.pid")
    }

    pub fn health_path(&self) -> PathBuf {
        self.loader.runtime_dir().join("clipkeepd.health")
    }

    pub fn health_status(&self) -> Option<String> {
        let content = fs::read_to_string(self.health_path()).ok()?;
        let value: Value = serde_json::from_str(&content).ok()?;
        value.get("status")?.as_str().map(str::to_owned)
    }

    /// Watcher side of the running server's monitor.
    pub fn watcher(&mut self) -> Result<&mut WatcherEnd, String> {
        if self.watcher.is_none() {
            self.watcher = Some(next_watcher(&self.launched)?);
        }
        self.watcher
            .as_mut()
            .ok_or_else(|| "watcher missing".to_owned())
    }

    pub fn run(&self, command: &str, arguments: &[&str]) -> Result<Transcript, String> {
        SessionClient::run(&self.socket_path(), command, arguments)
    }

    /// Polls `command` until its stdout equals `expected`.
    pub fn wait_for_output(
        &self,
        command: &str,
        arguments: &[&str],
        expected: &str,
    ) -> Result<(), String> {
        let deadline = Instant::now() + WAIT_TIMEOUT;
        let mut last = String::new();
        while Instant::now() < deadline {
            last = self.run(command, arguments)?.stdout_text();
            if last == expected {
                return Ok(());
            }
            thread::sleep(POLL_INTERVAL);
        }
        Err(format!("expected {expected:?} from {command}, last saw {last:?}"))
    }
}

impl Drop for ServerWorld {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.shutdown.fire();
            let _outcome = self.join();
        }
    }
}
