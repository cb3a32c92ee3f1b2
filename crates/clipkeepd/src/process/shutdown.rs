use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::PROCESS_TARGET;

/// Callback that ends [`ShutdownSignal::wait`] from inside the server.
pub(crate) type ShutdownTrigger = Arc<dyn Fn() + Send + Sync>;

/// Abstraction over shutdown notification mechanisms.
pub trait ShutdownSignal: Send + Sync {
    /// Callback releasing [`Self::wait`], handed to the `exit` command.
    fn trigger(&self) -> ShutdownTrigger;

    /// Blocks until shutdown should proceed.
    fn wait(&self) -> Result<(), ShutdownError>;
}

/// Errors reported by shutdown signal listeners.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Copy)]
enum Reason {
    Signal(i32),
    Exit,
}

/// Shutdown listener that waits for termination signals or an `exit`
/// command, whichever comes first.
pub struct SystemShutdownSignal {
    timeout: Duration,
    sender: Sender<Reason>,
    reasons: Mutex<Receiver<Reason>>,
}

impl SystemShutdownSignal {
    /// Builds a signal listener with the configured timeout budget.
    pub fn new(timeout: Duration) -> Self {
        let (sender, reasons) = mpsc::channel();
        Self {
            timeout,
            sender,
            reasons: Mutex::new(reasons),
        }
    }
}

impl ShutdownSignal for SystemShutdownSignal {
    fn trigger(&self) -> ShutdownTrigger {
        let sender = self.sender.clone();
        Arc::new(move || {
            if sender.send(Reason::Exit).is_err() {
                debug!(target: PROCESS_TARGET, "shutdown already under way");
            }
        })
    }

    fn wait(&self) -> Result<(), ShutdownError> {
        let mut signals = Signals::new([SIGTERM, SIGINT, SIGQUIT, SIGHUP])
            .map_err(|source| ShutdownError::Install { source })?;
        let handle = signals.handle();
        let sender = self.sender.clone();
        let forwarder = thread::Builder::new()
            .name("clipkeep-signals".to_owned())
            .spawn(move || {
                if let Some(signal) = signals.forever().next()
                    && sender.send(Reason::Signal(signal)).is_err()
                {
                    debug!(target: PROCESS_TARGET, signal, "signal arrived after shutdown");
                }
            })
            .map_err(|source| ShutdownError::Install { source })?;

        let reason = self
            .reasons
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .recv()
            .unwrap_or(Reason::Exit);
        handle.close();
        if forwarder.join().is_err() {
            warn!(target: PROCESS_TARGET, "signal forwarder panicked");
        }

        match reason {
            Reason::Signal(signal) => info!(
                target: PROCESS_TARGET,
                signal,
                timeout_ms = self.timeout.as_millis(),
                "shutdown signal received"
            ),
            Reason::Exit => info!(
                target: PROCESS_TARGET,
                timeout_ms = self.timeout.as_millis(),
                "shutdown requested by exit command"
            ),
        }
        Ok(())
    }
}
