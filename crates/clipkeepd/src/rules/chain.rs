//! Runs chains of external processes with engine-managed pipes.
//!
//! Every stage of a chain joins the process group of the first stage, so a
//! cancel or a timeout reaches the whole tree with one signal: `SIGTERM`
//! first, `SIGKILL` after [`KILL_GRACE`]. Only the last stage's stdout is
//! captured; stderr of every stage is drained on its own thread so no stage
//! can block on a full pipe.

use std::io::{Read, Write};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tracing::{debug, warn};

use super::RULES_TARGET;

/// Delay between `SIGTERM` and `SIGKILL` when a chain is stopped.
pub const KILL_GRACE: Duration = Duration::from_millis(200);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Exit code reported for a chain whose stage failed to spawn.
pub const SPAWN_FAILED_CODE: i32 = 127;
/// Exit code reported for a cancelled chain.
pub const CANCELLED_CODE: i32 = 130;
/// Exit code reported for a chain that hit its time limit.
pub const TIMED_OUT_CODE: i32 = 124;

/// Shared flag used to stop a running chain.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates an unset token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// True once [`CancelToken::cancel`] was called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A chain to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainRequest {
    /// Argv of each stage; stdout of stage k feeds stdin of stage k+1.
    pub stages: Vec<Vec<String>>,
    /// Bytes written to the first stage's stdin; `None` connects it to
    /// `/dev/null`.
    pub input: Option<Vec<u8>>,
    /// Wall-clock limit; `None` waits for natural completion.
    pub timeout: Option<Duration>,
}

/// How a chain ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainStatus {
    /// Every stage exited; carries the last stage's code (128 + signal for
    /// signalled processes).
    Exited(i32),
    /// A stage could not be started; earlier stages were killed.
    SpawnFailed {
        /// Zero-based stage index.
        stage: usize,
        /// Operating system message.
        message: String,
    },
    /// The chain was cancelled.
    Cancelled,
    /// The chain exceeded its time limit.
    TimedOut,
}

/// Everything a chain produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainOutput {
    /// How it ended.
    pub status: ChainStatus,
    /// Last stage stdout.
    pub stdout: Vec<u8>,
    /// Stderr of every stage, in stage order.
    pub stderr: Vec<u8>,
}

impl ChainOutput {
    /// True when the chain ran to completion with exit code zero.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        matches!(self.status, ChainStatus::Exited(0))
    }

    /// True when output must be discarded because the chain was stopped.
    #[must_use]
    pub const fn was_stopped(&self) -> bool {
        matches!(self.status, ChainStatus::Cancelled | ChainStatus::TimedOut)
    }

    /// Exit code surfaced to clients.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self.status {
            ChainStatus::Exited(code) => code,
            ChainStatus::SpawnFailed { .. } => SPAWN_FAILED_CODE,
            ChainStatus::Cancelled => CANCELLED_CODE,
            ChainStatus::TimedOut => TIMED_OUT_CODE,
        }
    }

    /// One-line description for logs and notifications.
    #[must_use]
    pub fn describe(&self) -> String {
        match &self.status {
            ChainStatus::Exited(code) => format!("exited with status {code}"),
            ChainStatus::SpawnFailed { stage, message } => {
                format!("stage {stage} failed to start: {message}")
            }
            ChainStatus::Cancelled => "cancelled".to_owned(),
            ChainStatus::TimedOut => "timed out".to_owned(),
        }
    }
}

/// Executes chains. Test code substitutes canned results.
pub trait ChainExecutor: Send + Sync {
    /// Runs `request` to completion, cancellation or timeout.
    fn run(&self, request: &ChainRequest, cancel: &CancelToken) -> ChainOutput;
}

/// Executor spawning real processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessChainRunner;

impl ChainExecutor for ProcessChainRunner {
    fn run(&self, request: &ChainRequest, cancel: &CancelToken) -> ChainOutput {
        run_chain(request, cancel)
    }
}

#[derive(Default)]
struct RunningChain {
    children: Vec<Child>,
    statuses: Vec<Option<ExitStatus>>,
    group: Option<Pid>,
    stderr: Vec<JoinHandle<Vec<u8>>>,
}

impl RunningChain {
    fn adopt(&mut self, mut child: Child) -> Option<ChildStdout> {
        if self.group.is_none() {
            self.group = i32::try_from(child.id()).ok().map(Pid::from_raw);
        }
        if let Some(mut stream) = child.stderr.take() {
            self.stderr.push(thread::spawn(move || {
                let mut buffer = Vec::new();
                if let Err(error) = stream.read_to_end(&mut buffer) {
                    debug!(target: RULES_TARGET, %error, "stderr capture ended early");
                }
                buffer
            }));
        }
        let stdout = child.stdout.take();
        self.children.push(child);
        self.statuses.push(None);
        stdout
    }

    fn group_id(&self) -> i32 {
        self.group.map_or(0, Pid::as_raw)
    }

    fn signal(&self, signal: Signal) {
        let Some(group) = self.group else {
            return;
        };
        match killpg(group, signal) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(error) => warn!(
                target: RULES_TARGET,
                group = group.as_raw(),
                ?signal,
                error = %error,
                "failed to signal chain process group"
            ),
        }
    }

    /// Collects exit statuses; returns true once every stage has exited.
    fn poll(&mut self) -> bool {
        for (child, status) in self.children.iter_mut().zip(self.statuses.iter_mut()) {
            if status.is_none() {
                match child.try_wait() {
                    Ok(done) => *status = done,
                    Err(error) => {
                        warn!(target: RULES_TARGET, error = %error, "failed to poll chain stage");
                        *status = Some(ExitStatus::from_raw(0xff << 8));
                    }
                }
            }
        }
        self.statuses.iter().all(Option::is_some)
    }

    fn stop(&mut self) {
        self.signal(Signal::SIGTERM);
        let deadline = Instant::now() + KILL_GRACE;
        while !self.poll() {
            if Instant::now() >= deadline {
                self.signal(Signal::SIGKILL);
                for child in &mut self.children {
                    if let Err(error) = child.kill() {
                        debug!(target: RULES_TARGET, %error, "stage already gone");
                    }
                }
                self.reap();
                return;
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn reap(&mut self) {
        for (child, status) in self.children.iter_mut().zip(self.statuses.iter_mut()) {
            if status.is_none() {
                *status = child.wait().ok();
            }
        }
    }

    fn last_code(&self) -> i32 {
        self.statuses
            .last()
            .copied()
            .flatten()
            .map_or(SPAWN_FAILED_CODE, exit_code)
    }

    fn collect_stderr(&mut self) -> Vec<u8> {
        self.stderr
            .drain(..)
            .filter_map(|handle| handle.join().ok())
            .flatten()
            .collect()
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .unwrap_or_else(|| 128 + status.signal().unwrap_or(0))
}

/// Runs a chain of processes, feeding `request.input` to the first stage.
///
/// Never panics and never leaves a stage running: every exit path waits for
/// all spawned processes.
#[must_use]
pub fn run_chain(request: &ChainRequest, cancel: &CancelToken) -> ChainOutput {
    let mut chain = RunningChain::default();
    let mut upstream: Option<ChildStdout> = None;
    let mut stdin_writer = None;

    for (stage, argv) in request.stages.iter().enumerate() {
        let Some((program, args)) = argv.split_first() else {
            return spawn_failed(&mut chain, stage, "empty command".to_owned());
        };
        let mut command = Command::new(program);
        command
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(chain.group_id());
        match upstream.take() {
            Some(previous) => command.stdin(Stdio::from(previous)),
            None if request.input.is_some() => command.stdin(Stdio::piped()),
            None => command.stdin(Stdio::null()),
        };
        match command.spawn() {
            Ok(mut child) => {
                if stage == 0
                    && let (Some(mut pipe), Some(input)) = (child.stdin.take(), request.input.clone())
                {
                    stdin_writer = Some(thread::spawn(move || {
                        if let Err(error) = pipe.write_all(&input) {
                            debug!(target: RULES_TARGET, %error, "first stage stopped reading stdin");
                        }
                    }));
                }
                upstream = chain.adopt(child);
            }
            Err(error) => return spawn_failed(&mut chain, stage, error.to_string()),
        }
    }
    if chain.children.is_empty() {
        return spawn_failed(&mut chain, 0, "empty chain".to_owned());
    }

    let reader = upstream.map(|mut stream| {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            if let Err(error) = stream.read_to_end(&mut buffer) {
                debug!(target: RULES_TARGET, %error, "stdout capture ended early");
            }
            buffer
        })
    });

    debug!(
        target: RULES_TARGET,
        stages = request.stages.len(),
        group = chain.group_id(),
        "chain started"
    );
    let deadline = request.timeout.map(|limit| Instant::now() + limit);
    let status = loop {
        if chain.poll() {
            break ChainStatus::Exited(chain.last_code());
        }
        if cancel.is_cancelled() {
            chain.stop();
            break ChainStatus::Cancelled;
        }
        if deadline.is_some_and(|limit| Instant::now() >= limit) {
            chain.stop();
            break ChainStatus::TimedOut;
        }
        thread::sleep(POLL_INTERVAL);
    };
    settle_reader(&chain, reader.as_ref());

    if let Some(writer) = stdin_writer
        && writer.join().is_err()
    {
        warn!(target: RULES_TARGET, "stdin writer panicked");
    }
    let stdout = reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default();
    let stderr = chain.collect_stderr();
    debug!(target: RULES_TARGET, ?status, "chain finished");
    ChainOutput {
        status,
        stdout,
        stderr,
    }
}

/// Waits briefly for the stdout reader; background members left in the
/// group that still hold the pipe open are killed. The group id cannot have
/// been reused while such a member exists.
fn settle_reader(chain: &RunningChain, reader: Option<&JoinHandle<Vec<u8>>>) {
    let Some(handle) = reader else {
        return;
    };
    let deadline = Instant::now() + KILL_GRACE;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            chain.signal(Signal::SIGKILL);
            return;
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn spawn_failed(chain: &mut RunningChain, stage: usize, message: String) -> ChainOutput {
    warn!(
        target: RULES_TARGET,
        stage,
        error = %message,
        "chain stage failed to start"
    );
    chain.signal(Signal::SIGKILL);
    for child in &mut chain.children {
        if let Err(error) = child.kill() {
            debug!(target: RULES_TARGET, %error, "stage already gone");
        }
    }
    chain.reap();
    ChainOutput {
        status: ChainStatus::SpawnFailed { stage, message },
        stdout: Vec::new(),
        stderr: chain.collect_stderr(),
    }
}
