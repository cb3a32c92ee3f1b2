//! The single owner of clipboard state.
//!
//! History, options, rules, the cached clipboard content and the action
//! table all live on one engine thread. Sessions, the watcher supervisor,
//! the pipeline worker, action threads and editor threads only talk to it
//! through the [`EngineQueue`]; commands carry a reply channel. Mutations are
//! applied one event at a time, so a command never observes a half-applied
//! commit group.

mod actions;
mod arguments;
mod commands;
mod editor;
mod notify;
mod options;
mod owner;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use clipkeep_types::channel::{Frame, WatcherSettings};
use clipkeep_types::session::Notification;
use clipkeep_types::{MimeData, Source};
use tracing::{debug, warn};

use crate::dispatch::DispatchError;
use crate::history::HistoryStore;
use crate::rules::{ChainExecutor, ChainOutput, PipelineOutcome, PipelineSink, PipelineWorker, RuleSet};
use crate::watcher::{Snapshot, SnapshotSink, WatcherError, WatcherLink, WatcherState};

use self::editor::EditTarget;
use self::owner::Owner;

pub use self::options::{InvalidValue, OptionName, Options, OptionsError};

pub(crate) const ENGINE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::engine");

/// Output of one command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    /// Bytes for the client's stdout.
    pub stdout: Vec<u8>,
    /// Bytes for the client's stderr.
    pub stderr: Vec<u8>,
    /// Exit status.
    pub status: i32,
}

impl Reply {
    /// A successful reply printing `stdout`.
    #[must_use]
    pub fn output(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    fn append(&mut self, other: Self) {
        self.stdout.extend(other.stdout);
        self.stderr.extend(other.stderr);
        self.status = other.status;
    }
}

pub(crate) type ReplySender = Sender<Result<Reply, DispatchError>>;

/// Clipboard side effects the engine needs from the watcher.
pub trait ClipboardMonitor: Send + 'static {
    /// Places content on a clipboard buffer.
    ///
    /// # Errors
    ///
    /// Fails when the watcher is not running.
    fn set_content(&self, source: Source, data: MimeData) -> Result<(), WatcherError>;

    /// Pushes new monitoring settings.
    ///
    /// # Errors
    ///
    /// Fails when the supervisor is gone.
    fn reconfigure(&self, settings: WatcherSettings) -> Result<(), WatcherError>;

    /// Current watcher state.
    fn state(&self) -> WatcherState;
}

impl ClipboardMonitor for WatcherLink {
    fn set_content(&self, source: Source, data: MimeData) -> Result<(), WatcherError> {
        self.send(Frame::SetContent { source, data })
    }

    fn reconfigure(&self, settings: WatcherSettings) -> Result<(), WatcherError> {
        Self::reconfigure(self, settings)
    }

    fn state(&self) -> WatcherState {
        Self::state(self)
    }
}

pub(crate) enum EngineEvent {
    Command {
        command: String,
        arguments: Vec<Vec<u8>>,
        reply: ReplySender,
    },
    Subscribe(Sender<Notification>),
    Snapshot(Snapshot),
    WatcherState(WatcherState),
    PipelineFinished {
        outcome: PipelineOutcome,
        ack: Sender<()>,
    },
    ActionFinished {
        id: u64,
        output: ChainOutput,
    },
    EditFinished {
        target: EditTarget,
        result: Result<String, String>,
    },
    Shutdown,
}

/// The engine's event queue, created before the components that feed it.
pub struct EngineQueue {
    sender: Sender<EngineEvent>,
    inbox: Receiver<EngineEvent>,
}

impl EngineQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        let (sender, inbox) = mpsc::channel();
        Self { sender, inbox }
    }

    /// Sink that forwards watcher and pipeline output into this queue.
    #[must_use]
    pub fn sink(&self) -> EngineSink {
        EngineSink {
            events: self.sender.clone(),
        }
    }
}

impl Default for EngineQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Forwards snapshots, watcher states and pipeline outcomes to the engine.
#[derive(Clone)]
pub struct EngineSink {
    events: Sender<EngineEvent>,
}

impl SnapshotSink for EngineSink {
    fn snapshot(&self, snapshot: Snapshot) {
        if self.events.send(EngineEvent::Snapshot(snapshot)).is_err() {
            debug!(target: ENGINE_TARGET, "engine gone; snapshot dropped");
        }
    }

    fn state_changed(&self, state: &WatcherState) {
        if self.events.send(EngineEvent::WatcherState(*state)).is_err() {
            debug!(target: ENGINE_TARGET, "engine gone; watcher state dropped");
        }
    }
}

impl PipelineSink for EngineSink {
    fn deliver(&self, outcome: PipelineOutcome) -> bool {
        let (ack, applied) = mpsc::channel();
        if self
            .events
            .send(EngineEvent::PipelineFinished { outcome, ack })
            .is_err()
        {
            return false;
        }
        applied.recv().is_ok()
    }
}

/// Everything the engine owns, handed over at startup.
pub struct EngineParts {
    /// Loaded history.
    pub history: HistoryStore,
    /// Loaded runtime options.
    pub options: Options,
    /// Where option changes are written.
    pub options_path: PathBuf,
    /// Loaded rules.
    pub rules: RuleSet,
    /// Clipboard access through the watcher.
    pub monitor: Box<dyn ClipboardMonitor>,
    /// Runs rule chains, actions and the editor.
    pub executor: Arc<dyn ChainExecutor>,
    /// Invoked by the `exit` command after history was saved.
    pub on_exit: Box<dyn Fn() + Send>,
    /// Problems found during startup, repeated to every new subscriber.
    pub warnings: Vec<String>,
}

/// Clonable client of the engine used by sessions.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    events: Sender<EngineEvent>,
}

impl EngineHandle {
    /// Runs a command and waits for its reply. Commands that start an
    /// action reply once the action has finished.
    ///
    /// # Errors
    ///
    /// Returns the command's failure, or
    /// [`DispatchError::EngineUnavailable`] when the engine has stopped.
    pub fn execute(
        &self,
        command: impl Into<String>,
        arguments: Vec<Vec<u8>>,
    ) -> Result<Reply, DispatchError> {
        let (reply, response) = mpsc::channel();
        self.events
            .send(EngineEvent::Command {
                command: command.into(),
                arguments,
                reply,
            })
            .map_err(|_| DispatchError::EngineUnavailable)?;
        response
            .recv()
            .map_err(|_| DispatchError::EngineUnavailable)?
    }

    /// Registers an interactive session for notifications.
    ///
    /// # Errors
    ///
    /// Fails when the engine has stopped.
    pub fn subscribe(&self) -> Result<Receiver<Notification>, DispatchError> {
        let (sender, notifications) = mpsc::channel();
        self.events
            .send(EngineEvent::Subscribe(sender))
            .map_err(|_| DispatchError::EngineUnavailable)?;
        Ok(notifications)
    }
}

/// Owner of the engine thread and the pipeline worker.
pub struct Engine {
    handle: EngineHandle,
    thread: Option<JoinHandle<PipelineWorker>>,
}

impl Engine {
    /// Starts the pipeline worker and the engine thread.
    ///
    /// # Errors
    ///
    /// Fails when a thread cannot be spawned.
    pub fn spawn(queue: EngineQueue, parts: EngineParts) -> io::Result<Self> {
        let EngineQueue { sender, inbox } = queue;
        let worker = PipelineWorker::spawn(
            Arc::clone(&parts.executor),
            EngineSink {
                events: sender.clone(),
            },
        )?;
        let owner = Owner::new(parts, worker, sender.clone());
        let thread = thread::Builder::new()
            .name("clipkeep-engine".to_owned())
            .spawn(move || owner.run(&inbox))?;
        Ok(Self {
            handle: EngineHandle { events: sender },
            thread: Some(thread),
        })
    }

    /// A new client handle.
    #[must_use]
    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    /// Stops running actions, saves history and joins every engine thread.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        if self.handle.events.send(EngineEvent::Shutdown).is_err() {
            debug!(target: ENGINE_TARGET, "engine already stopped");
        }
        match thread.join() {
            Ok(worker) => worker.shutdown(),
            Err(_) => warn!(target: ENGINE_TARGET, "engine thread panicked"),
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}
