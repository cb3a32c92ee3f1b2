//! In-process watcher double connected to the supervisor through pipes.

use std::io::{self, PipeReader, PipeWriter, Read, Write};
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use clipkeep_types::channel::{Frame, FrameReader};
use clipkeep_types::{MimeData, Source};

use crate::watcher::{WatcherLauncher, WatcherProcess};

use super::WAIT_TIMEOUT;

/// Launcher handing the watcher side of every launch to the test.
#[derive(Clone)]
pub struct PipeLauncher {
    launched: Arc<Mutex<Sender<WatcherEnd>>>,
}

impl PipeLauncher {
    pub fn new() -> (Self, Receiver<WatcherEnd>) {
        let (sender, launched) = mpsc::channel();
        let launcher = Self {
            launched: Arc::new(Mutex::new(sender)),
        };
        (launcher, launched)
    }
}

impl WatcherLauncher for PipeLauncher {
    fn launch(&self) -> io::Result<Box<dyn WatcherProcess>> {
        let (server_reader, watcher_writer) = io::pipe()?;
        let (watcher_reader, server_writer) = io::pipe()?;
        let exited = Arc::new(AtomicBool::new(false));
        let output = Arc::new(Mutex::new(Some(watcher_writer)));
        let end = WatcherEnd {
            output: Arc::clone(&output),
            input: FrameReader::new(watcher_reader),
        };
        self.launched
            .lock()
            .expect("launch mutex poisoned")
            .send(end)
            .map_err(io::Error::other)?;
        Ok(Box::new(PipeProcess {
            reader: Some(server_reader),
            writer: Some(server_writer),
            output,
            exited,
        }))
    }

    fn program(&self) -> &str {
        "fake-watcher"
    }
}

/// Test-side ends of one launched watcher.
pub struct WatcherEnd {
    output: Arc<Mutex<Option<PipeWriter>>>,
    input: FrameReader<PipeReader>,
}

impl WatcherEnd {
    /// Reports a clipboard change carrying `text`.
    pub fn copy_text(&self, text: &str) -> Result<(), String> {
        let frame = Frame::Snapshot {
            source: Source::Clipboard,
            window_title: None,
            data: MimeData::from_text(text),
        };
        let bytes = frame.encode().map_err(|error| error.to_string())?;
        let mut output = self.output.lock().map_err(|error| error.to_string())?;
        let writer = output
            .as_mut()
            .ok_or_else(|| "watcher output closed".to_owned())?;
        writer.write_all(&bytes).map_err(|error| error.to_string())
    }

    /// Next frame the supervisor sent to the watcher.
    pub fn next_frame(&mut self) -> Result<Frame, String> {
        self.input
            .read_frame()
            .map_err(|error| error.to_string())?
            .ok_or_else(|| "supervisor closed the channel".to_owned())
    }
}

/// Receives the watcher end of the next launch.
pub fn next_watcher(launched: &Receiver<WatcherEnd>) -> Result<WatcherEnd, String> {
    launched
        .recv_timeout(WAIT_TIMEOUT)
        .map_err(|error| format!("watcher was not launched: {error}"))
}

struct PipeProcess {
    reader: Option<PipeReader>,
    writer: Option<PipeWriter>,
    output: Arc<Mutex<Option<PipeWriter>>>,
    exited: Arc<AtomicBool>,
}

impl PipeProcess {
    fn exit(&self) {
        self.exited.store(true, Ordering::SeqCst);
        if let Ok(mut output) = self.output.lock() {
            output.take();
        }
    }
}

impl WatcherProcess for PipeProcess {
    fn take_reader(&mut self) -> Option<Box<dyn Read + Send>> {
        self.reader
            .take()
            .map(|reader| Box::new(reader) as Box<dyn Read + Send>)
    }

    fn take_writer(&mut self) -> Option<Box<dyn Write + Send>> {
        self.writer
            .take()
            .map(|writer| Box::new(writer) as Box<dyn Write + Send>)
    }

    fn terminate(&mut self) -> io::Result<()> {
        self.exit();
        Ok(())
    }

    fn kill(&mut self) -> io::Result<()> {
        self.exit();
        Ok(())
    }

    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        Ok(self
            .exited
            .load(Ordering::SeqCst)
            .then(|| ExitStatus::from_raw(0)))
    }

    fn id(&self) -> u32 {
        4242
    }
}
