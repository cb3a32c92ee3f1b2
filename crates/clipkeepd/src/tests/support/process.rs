//! Process collaborators that stay inside the test process.

use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex};

use clipkeep_config::RuntimePaths;

use crate::process::daemonizer::{DaemonizeError, Daemonizer};
use crate::process::shutdown::{ShutdownError, ShutdownSignal, ShutdownTrigger};

/// Records the runtime directory of each detach request instead of
/// forking.
#[derive(Clone, Default)]
pub struct TestDaemonizer {
    detached_into: Arc<Mutex<Vec<PathBuf>>>,
}

impl TestDaemonizer {
    pub fn detached_into(&self) -> Vec<PathBuf> {
        self.detached_into.lock().expect("daemonizer mutex poisoned").clone()
    }
}

impl Daemonizer for TestDaemonizer {
    fn daemonize(&self, paths: &RuntimePaths) -> Result<(), DaemonizeError> {
        self.detached_into
            .lock()
            .expect("daemonizer mutex poisoned")
            .push(paths.runtime_dir().to_path_buf());
        Ok(())
    }
}

/// Shutdown signal released by the test or by the `exit` command.
#[derive(Clone)]
pub struct TestShutdownSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl TestShutdownSignal {
    pub fn new() -> Self {
        Self {
            inner: Arc::new((Mutex::new(false), Condvar::new())),
        }
    }

    pub fn fire(&self) {
        let (lock, cvar) = &*self.inner;
        let mut triggered = lock.lock().expect("shutdown mutex poisoned");
        *triggered = true;
        cvar.notify_all();
    }
}

impl ShutdownSignal for TestShutdownSignal {
    fn trigger(&self) -> ShutdownTrigger {
        let signal = self.clone();
        Arc::new(move || signal.fire())
    }

    fn wait(&self) -> Result<(), ShutdownError> {
        let (lock, cvar) = &*self.inner;
        let mut triggered = lock.lock().expect("shutdown mutex poisoned");
        while !*triggered {
            triggered = cvar
                .wait(triggered)
                .expect("shutdown mutex poisoned during wait");
        }
        Ok(())
    }
}
