//! In-memory clipboard and a running watcher for behavioural tests.

use std::collections::HashMap;
use std::io::{self, Cursor, PipeWriter, Write};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use clipkeep_types::channel::{Frame, FrameReader};
use clipkeep_types::{MimeData, Source};

use crate::{BackendError, ClipboardBackend, WatcherError, run};

const TEST_POLL_INTERVAL: Duration = Duration::from_millis(10);
const WAIT_LIMIT: Duration = Duration::from_secs(5);

/// Clipboard buffers shared between the test and the watcher thread.
#[derive(Debug, Clone, Default)]
pub(super) struct MemoryClipboard {
    buffers: Arc<Mutex<HashMap<Source, MimeData>>>,
}

impl MemoryClipboard {
    pub fn set(&self, source: Source, data: MimeData) {
        self.buffers
            .lock()
            .expect("clipboard lock")
            .insert(source, data);
    }

    pub fn get(&self, source: Source) -> Option<MimeData> {
        self.buffers
            .lock()
            .expect("clipboard lock")
            .get(&source)
            .cloned()
    }
}

impl ClipboardBackend for MemoryClipboard {
    fn formats(&self, source: Source) -> Result<Vec<String>, BackendError> {
        Ok(self
            .get(source)
            .map(|data| data.formats().map(str::to_owned).collect())
            .unwrap_or_default())
    }

    fn read(&self, source: Source, mime: &str) -> Result<Option<Vec<u8>>, BackendError> {
        Ok(self
            .get(source)
            .and_then(|data| data.get(mime).map(<[u8]>::to_vec)))
    }

    fn write(&self, source: Source, data: &MimeData) -> Result<(), BackendError> {
        self.set(source, data.clone());
        Ok(())
    }

    fn window_title(&self) -> Option<String> {
        None
    }
}

/// Output buffer readable while the watcher writes to it.
#[derive(Debug, Clone, Default)]
pub(super) struct SharedOutput {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedOutput {
    /// Frames written so far. A trailing partial frame is ignored.
    pub fn frames(&self) -> Vec<Frame> {
        let bytes = self.bytes.lock().expect("output lock").clone();
        let mut reader = FrameReader::new(Cursor::new(bytes));
        let mut frames = Vec::new();
        while let Ok(Some(frame)) = reader.read_frame() {
            frames.push(frame);
        }
        frames
    }
}

impl Write for SharedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes
            .lock()
            .map_err(|_| io::Error::other("output lock poisoned"))?
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A watcher running on its own thread with a pipe standing in for stdin.
pub(super) struct RunningWatcher {
    input: Option<PipeWriter>,
    output: SharedOutput,
    handle: Option<JoinHandle<Result<(), WatcherError>>>,
}

impl RunningWatcher {
    pub fn start(clipboard: &MemoryClipboard) -> Self {
        let (reader, writer) = io::pipe().expect("create pipe");
        let output = SharedOutput::default();
        let thread_output = output.clone();
        let backend = clipboard.clone();
        let handle = thread::spawn(move || run(reader, thread_output, backend, TEST_POLL_INTERVAL));
        Self {
            input: Some(writer),
            output,
            handle: Some(handle),
        }
    }

    pub fn send_raw(&mut self, bytes: &[u8]) {
        let input = self.input.as_mut().expect("watcher input open");
        input.write_all(bytes).expect("write frame");
        input.flush().expect("flush frame");
    }

    pub fn send(&mut self, frame: &Frame) {
        self.send_raw(&frame.encode().expect("encode frame"));
    }

    /// Waits until `condition` holds, polling the shared state.
    pub fn wait_for(&self, mut condition: impl FnMut(&[Frame]) -> bool) -> Vec<Frame> {
        let deadline = Instant::now() + WAIT_LIMIT;
        loop {
            let frames = self.output.frames();
            if condition(&frames) {
                return frames;
            }
            assert!(Instant::now() < deadline, "timed out; frames so far: {frames:?}");
            thread::sleep(TEST_POLL_INTERVAL);
        }
    }

    /// Closes stdin and returns the loop's result.
    pub fn stop(&mut self) -> Result<(), WatcherError> {
        drop(self.input.take());
        self.handle
            .take()
            .expect("watcher still running")
            .join()
            .expect("watcher thread panicked")
    }
}

impl Drop for RunningWatcher {
    fn drop(&mut self) {
        drop(self.input.take());
        if let Some(handle) = self.handle.take() {
            let _outcome = handle.join();
        }
    }
}

/// Blocks until `condition` holds for the clipboard.
pub(super) fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + WAIT_LIMIT;
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for the clipboard");
        thread::sleep(TEST_POLL_INTERVAL);
    }
}
