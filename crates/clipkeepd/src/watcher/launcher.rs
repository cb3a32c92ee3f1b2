//! Spawning the watcher program.

use std::io::{self, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;

/// A running watcher: a duplex byte channel plus process control.
pub trait WatcherProcess: Send {
    /// Stream of frames written by the watcher. Yields `None` once taken.
    fn take_reader(&mut self) -> Option<Box<dyn Read + Send>>;

    /// Stream of frames read by the watcher. Yields `None` once taken.
    fn take_writer(&mut self) -> Option<Box<dyn Write + Send>>;

    /// Asks the process to exit.
    ///
    /// # Errors
    ///
    /// Fails when the signal cannot be delivered.
    fn terminate(&mut self) -> io::Result<()>;

    /// Forces the process to exit.
    ///
    /// # Errors
    ///
    /// Fails when the process cannot be killed.
    fn kill(&mut self) -> io::Result<()>;

    /// Reaps the process if it has exited.
    ///
    /// # Errors
    ///
    /// Fails when the process status cannot be queried.
    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>>;

    /// Process identifier, for logs.
    fn id(&self) -> u32;
}

/// Starts watcher processes.
pub trait WatcherLauncher: Send + 'static {
    /// Spawns a fresh watcher.
    ///
    /// # Errors
    ///
    /// Fails when the process cannot be spawned.
    fn launch(&self) -> io::Result<Box<dyn WatcherProcess>>;

    /// Program name for logs.
    fn program(&self) -> &str;
}

/// Launches a program found through `PATH` with piped stdin and stdout.
/// Stderr is inherited so the watcher's own logs end up next to ours.
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    program: String,
}

impl CommandLauncher {
    /// Launcher for `program`.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl WatcherLauncher for CommandLauncher {
    fn launch(&self) -> io::Result<Box<dyn WatcherProcess>> {
        let child = Command::new(&self.program)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;
        Ok(Box::new(ChildWatcher { child }))
    }

    fn program(&self) -> &str {
        &self.program
    }
}

struct ChildWatcher {
    child: Child,
}

impl WatcherProcess for ChildWatcher {
    fn take_reader(&mut self) -> Option<Box<dyn Read + Send>> {
        self.child
            .stdout
            .take()
            .map(|stdout| Box::new(stdout) as Box<dyn Read + Send>)
    }

    fn take_writer(&mut self) -> Option<Box<dyn Write + Send>> {
        self.child
            .stdin
            .take()
            .map(|stdin| Box::new(stdin) as Box<dyn Write + Send>)
    }

    fn terminate(&mut self) -> io::Result<()> {
        let pid = i32::try_from(self.child.id())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
        kill(Pid::from_raw(pid), Signal::SIGTERM).map_err(io::Error::from)
    }

    fn kill(&mut self) -> io::Result<()> {
        self.child.kill()
    }

    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    fn id(&self) -> u32 {
        self.child.id()
    }
}
