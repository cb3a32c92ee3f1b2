//! The supervisor thread and the handles used to talk to it.

use std::io::{self, BufReader, Read, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use clipkeep_types::channel::{Frame, FrameReader, FrameWriter, WatcherSettings};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::launcher::{WatcherLauncher, WatcherProcess};
use super::state::WatcherState;
use super::{Snapshot, SnapshotSink, WATCHER_TARGET};
use crate::health::HealthReporter;

/// Delay before the first restart.
pub const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
/// Upper bound of the restart delay.
pub const MAX_BACKOFF: Duration = Duration::from_secs(5);
/// Failures without a valid frame in between after which restarts stop.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 5;
/// Consecutive undecodable frames after which the channel counts as broken.
pub const MAX_FRAME_FAULTS: u32 = 3;
/// Time the watcher gets to exit after SIGTERM before it is killed.
pub const TERMINATE_GRACE: Duration = Duration::from_secs(2);

const EXIT_POLL: Duration = Duration::from_millis(20);
const KILL_WAIT: Duration = Duration::from_millis(500);

/// Restart delay after `failures` consecutive failures.
#[must_use]
pub fn backoff_delay(failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(16);
    INITIAL_BACKOFF
        .checked_mul(1_u32 << exponent)
        .map_or(MAX_BACKOFF, |delay| delay.min(MAX_BACKOFF))
}

/// Errors returned to callers of [`WatcherLink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WatcherError {
    /// The watcher is not accepting frames right now.
    #[error("clipboard monitor is not running (state: {state})")]
    Unavailable {
        /// State at the time of the request.
        state: WatcherState,
    },
    /// The supervisor thread has exited.
    #[error("clipboard monitor supervisor has stopped")]
    Stopped,
}

enum Control {
    Send(Frame),
    Reconfigure(WatcherSettings),
    Shutdown,
}

enum ReaderMessage {
    Valid,
    Closed,
    Broken(String),
}

enum Event {
    Control(Control),
    Reader {
        generation: u64,
        message: ReaderMessage,
    },
}

/// Clonable sender side used by the engine.
#[derive(Clone)]
pub struct WatcherLink {
    events: Sender<Event>,
    state: Arc<Mutex<WatcherState>>,
}

impl WatcherLink {
    /// Queues a frame for the watcher.
    ///
    /// # Errors
    ///
    /// Fails when the watcher is not running or the supervisor is gone.
    pub fn send(&self, frame: Frame) -> Result<(), WatcherError> {
        let state = self.state();
        if !state.is_running() {
            return Err(WatcherError::Unavailable { state });
        }
        self.push(Control::Send(frame))
    }

    /// Replaces the monitoring settings. They are pushed immediately when
    /// the watcher runs and on every later start.
    ///
    /// # Errors
    ///
    /// Fails when the supervisor is gone.
    pub fn reconfigure(&self, settings: WatcherSettings) -> Result<(), WatcherError> {
        self.push(Control::Reconfigure(settings))
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> WatcherState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, control: Control) -> Result<(), WatcherError> {
        self.events
            .send(Event::Control(control))
            .map_err(|_| WatcherError::Stopped)
    }
}

/// Owner of the supervisor thread.
pub struct WatcherHandle {
    link: WatcherLink,
    thread: Option<JoinHandle<()>>,
}

impl WatcherHandle {
    /// Starts supervising watchers produced by `launcher`.
    ///
    /// # Errors
    ///
    /// Fails when the supervisor thread cannot be spawned.
    pub fn spawn<L>(
        launcher: L,
        sink: Arc<dyn SnapshotSink>,
        reporter: Arc<dyn HealthReporter>,
        settings: WatcherSettings,
    ) -> io::Result<Self>
    where
        L: WatcherLauncher,
    {
        let (events, inbox) = mpsc::channel();
        let state = Arc::new(Mutex::new(WatcherState::Starting));
        let supervisor = Supervisor {
            launcher: Box::new(launcher),
            sink,
            reporter,
            state: Arc::clone(&state),
            inbox,
            events: events.clone(),
            settings,
            failures: 0,
            generation: 0,
        };
        let thread = thread::Builder::new()
            .name("clipkeep-watcher".to_owned())
            .spawn(move || supervisor.run())?;
        Ok(Self {
            link: WatcherLink { events, state },
            thread: Some(thread),
        })
    }

    /// A new link to the supervisor.
    #[must_use]
    pub fn link(&self) -> WatcherLink {
        self.link.clone()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> WatcherState {
        self.link.state()
    }

    /// Terminates the watcher and joins the supervisor. Returns once the
    /// state is [`WatcherState::Terminated`].
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        if self.link.push(Control::Shutdown).is_err() {
            debug!(target: WATCHER_TARGET, "supervisor already stopped");
        }
        if thread.join().is_err() {
            warn!(target: WATCHER_TARGET, "watcher supervisor panicked");
        }
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

enum Exit {
    Shutdown,
    Crashed(String),
}

struct Instance {
    process: Box<dyn WatcherProcess>,
    writer: Option<FrameWriter<Box<dyn Write + Send>>>,
    reader: Option<JoinHandle<()>>,
}

struct Supervisor {
    launcher: Box<dyn WatcherLauncher>,
    sink: Arc<dyn SnapshotSink>,
    reporter: Arc<dyn HealthReporter>,
    state: Arc<Mutex<WatcherState>>,
    inbox: Receiver<Event>,
    events: Sender<Event>,
    settings: WatcherSettings,
    failures: u32,
    generation: u64,
}

impl Supervisor {
    fn run(mut self) {
        loop {
            self.set_state(WatcherState::Starting);
            let reason = match self.start() {
                Ok(mut instance) => match self.serve(&mut instance) {
                    Exit::Shutdown => {
                        self.set_state(WatcherState::Terminating);
                        self.stop_instance(instance, TERMINATE_GRACE);
                        self.set_state(WatcherState::Terminated);
                        return;
                    }
                    Exit::Crashed(reason) => {
                        self.stop_instance(instance, Duration::ZERO);
                        reason
                    }
                },
                Err(error) => error.to_string(),
            };

            self.failures = self.failures.saturating_add(1);
            self.reporter.watcher_crashed(self.failures, &reason);
            self.set_state(WatcherState::Crashed {
                failures: self.failures,
            });
            if self.failures >= MAX_CONSECUTIVE_FAILURES {
                self.set_state(WatcherState::GaveUp);
                self.reporter.watcher_gave_up(self.failures);
                self.idle_until_shutdown();
                self.set_state(WatcherState::Terminated);
                return;
            }
            if self.sleep_or_shutdown(backoff_delay(self.failures)) {
                self.set_state(WatcherState::Terminated);
                return;
            }
        }
    }

    fn start(&mut self) -> io::Result<Instance> {
        let mut process = self.launcher.launch()?;
        let (Some(reader), Some(writer)) = (process.take_reader(), process.take_writer()) else {
            if let Err(error) = process.kill() {
                debug!(target: WATCHER_TARGET, error = %error, "failed to kill watcher");
            }
            return Err(io::Error::other("watcher started without piped streams"));
        };
        info!(
            target: WATCHER_TARGET,
            program = self.launcher.program(),
            pid = process.id(),
            "clipboard watcher started"
        );
        self.set_state(WatcherState::Started);

        self.generation = self.generation.wrapping_add(1);
        let reader = spawn_reader(
            reader,
            self.generation,
            self.events.clone(),
            Arc::clone(&self.sink),
        )?;
        let mut instance = Instance {
            process,
            writer: Some(FrameWriter::new(writer)),
            reader: Some(reader),
        };
        if let Err(error) = write(&mut instance, &Frame::Configure(self.settings.clone())) {
            self.stop_instance(instance, Duration::ZERO);
            return Err(error);
        }
        self.set_state(WatcherState::Running);
        Ok(instance)
    }

    fn serve(&mut self, instance: &mut Instance) -> Exit {
        loop {
            let Ok(event) = self.inbox.recv() else {
                return Exit::Shutdown;
            };
            match event {
                Event::Control(Control::Shutdown) => return Exit::Shutdown,
                Event::Control(Control::Send(frame)) => {
                    if let Err(error) = write(instance, &frame) {
                        return Exit::Crashed(error.to_string());
                    }
                }
                Event::Control(Control::Reconfigure(settings)) => {
                    self.settings = settings;
                    let frame = Frame::Configure(self.settings.clone());
                    if let Err(error) = write(instance, &frame) {
                        return Exit::Crashed(error.to_string());
                    }
                }
                Event::Reader { generation, .. } if generation != self.generation => {}
                Event::Reader { message, .. } => match message {
                    ReaderMessage::Valid => self.failures = 0,
                    ReaderMessage::Closed => {
                        return Exit::Crashed("watcher closed the snapshot channel".to_owned());
                    }
                    ReaderMessage::Broken(reason) => return Exit::Crashed(reason),
                },
            }
        }
    }

    /// Waits out a restart delay. Returns true when shutdown was requested.
    fn sleep_or_shutdown(&mut self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            match self.inbox.recv_timeout(remaining) {
                Ok(Event::Control(Control::Shutdown)) | Err(RecvTimeoutError::Disconnected) => {
                    return true;
                }
                Ok(event) => self.absorb_idle(event),
                Err(RecvTimeoutError::Timeout) => return false,
            }
        }
    }

    fn idle_until_shutdown(&mut self) {
        while let Ok(event) = self.inbox.recv() {
            if matches!(event, Event::Control(Control::Shutdown)) {
                return;
            }
            self.absorb_idle(event);
        }
    }

    fn absorb_idle(&mut self, event: Event) {
        match event {
            Event::Control(Control::Reconfigure(settings)) => self.settings = settings,
            Event::Control(Control::Send(_)) => {
                debug!(target: WATCHER_TARGET, "dropping frame while the watcher is down");
            }
            Event::Control(Control::Shutdown) | Event::Reader { .. } => {}
        }
    }

    fn stop_instance(&self, mut instance: Instance, grace: Duration) {
        instance.writer.take();
        if !grace.is_zero() {
            if let Err(error) = instance.process.terminate() {
                debug!(target: WATCHER_TARGET, error = %error, "failed to signal watcher");
            }
            wait_for_exit(instance.process.as_mut(), grace);
        }
        if !matches!(instance.process.try_wait(), Ok(Some(_))) {
            if let Err(error) = instance.process.kill() {
                debug!(target: WATCHER_TARGET, error = %error, "failed to kill watcher");
            }
            wait_for_exit(instance.process.as_mut(), KILL_WAIT);
        }
        if let Some(reader) = instance.reader.take()
            && reader.join().is_err()
        {
            warn!(target: WATCHER_TARGET, "snapshot reader panicked");
        }
    }

    fn set_state(&self, next: WatcherState) {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state == next {
                return;
            }
            *state = next;
        }
        debug!(target: WATCHER_TARGET, state = %next, "watcher state changed");
        self.reporter.watcher_state(next);
        self.sink.state_changed(&next);
    }
}

fn write(instance: &mut Instance, frame: &Frame) -> io::Result<()> {
    let Some(writer) = instance.writer.as_mut() else {
        return Err(io::Error::from(io::ErrorKind::BrokenPipe));
    };
    writer.write_frame(frame).map_err(io::Error::other)
}

fn wait_for_exit(process: &mut dyn WatcherProcess, limit: Duration) {
    let deadline = Instant::now() + limit;
    loop {
        match process.try_wait() {
            Ok(None) if Instant::now() < deadline => thread::sleep(EXIT_POLL),
            Ok(_) => return,
            Err(error) => {
                debug!(target: WATCHER_TARGET, error = %error, "failed to poll watcher");
                return;
            }
        }
    }
}

fn spawn_reader(
    stream: Box<dyn Read + Send>,
    generation: u64,
    events: Sender<Event>,
    sink: Arc<dyn SnapshotSink>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("clipkeep-snapshots".to_owned())
        .spawn(move || {
            let message = read_snapshots(stream, &events, sink.as_ref(), generation);
            if events.send(Event::Reader { generation, message }).is_err() {
                debug!(target: WATCHER_TARGET, "supervisor gone before reader finished");
            }
        })
}

/// Decodes frames until the channel closes or breaks.
fn read_snapshots(
    stream: Box<dyn Read + Send>,
    events: &Sender<Event>,
    sink: &dyn SnapshotSink,
    generation: u64,
) -> ReaderMessage {
    let mut frames = FrameReader::new(BufReader::new(stream));
    let mut faults = 0_u32;
    loop {
        match frames.read_frame() {
            Ok(Some(Frame::Snapshot {
                source,
                window_title,
                data,
            })) => {
                faults = 0;
                sink.snapshot(Snapshot {
                    source,
                    window_title,
                    data,
                });
                let valid = Event::Reader {
                    generation,
                    message: ReaderMessage::Valid,
                };
                if events.send(valid).is_err() {
                    return ReaderMessage::Closed;
                }
            }
            Ok(Some(_)) => {
                warn!(target: WATCHER_TARGET, "ignoring frame the watcher must not send");
            }
            Ok(None) => return ReaderMessage::Closed,
            Err(error) if error.is_fatal() => return ReaderMessage::Broken(error.to_string()),
            Err(error) => {
                faults += 1;
                warn!(
                    target: WATCHER_TARGET,
                    error = %error,
                    faults,
                    "discarding malformed frame"
                );
                if faults >= MAX_FRAME_FAULTS {
                    return ReaderMessage::Broken(format!(
                        "{faults} consecutive malformed frames, last: {error}"
                    ));
                }
            }
        }
    }
}
