//! Clipboard watcher worker for clipkeepd.
//!
//! `clipkeep-watch` is started by the server with piped standard streams.
//! It reads `Configure` and `SetContent` frames from stdin, polls the
//! desktop clipboard tools and writes a `Snapshot` frame to stdout whenever
//! a buffer changes. The process ends cleanly when the server closes stdin
//! and exits with a failure status when the clipboard tools cannot be run,
//! which the server's supervisor treats as a crash.

mod backend;
mod error;
mod monitor;
pub mod telemetry;

use std::io::{Read, Write};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use clipkeep_types::channel::{Frame, FrameError, FrameReader, FrameWriter};
use tracing::{info, warn};

pub use backend::{ClipboardBackend, CommandBackend, Tool};
pub use error::{BackendError, WatcherError};
pub use monitor::Monitor;

const LOG_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::channel");

/// Default delay between two polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

enum Inbound {
    Frame(Frame),
    Closed,
    Failed(FrameError),
}

/// Runs the watcher until `input` reaches end of stream.
///
/// Frames from `input` are decoded on a separate thread so a poll never
/// waits for the server. Frames that fail to decode but leave the stream on
/// a frame boundary are logged and skipped.
///
/// # Errors
///
/// Returns an error when the clipboard tools cannot be run, when `output`
/// cannot be written or when `input` fails mid-frame.
pub fn run<R, W, B>(
    input: R,
    output: W,
    backend: B,
    poll_interval: Duration,
) -> Result<(), WatcherError>
where
    R: Read + Send + 'static,
    W: Write,
    B: ClipboardBackend,
{
    let (sender, inbox) = mpsc::channel();
    let reader = thread::Builder::new()
        .name("clipkeep-watch-reader".to_owned())
        .spawn(move || read_frames(input, &sender))
        .map_err(WatcherError::SpawnReader)?;

    let mut writer = FrameWriter::new(output);
    let mut monitor = Monitor::new(backend);
    let mut next_poll = Instant::now();
    loop {
        let wait = next_poll.saturating_duration_since(Instant::now());
        match inbox.recv_timeout(wait) {
            Ok(Inbound::Frame(frame)) => monitor.apply(frame)?,
            Ok(Inbound::Closed) | Err(RecvTimeoutError::Disconnected) => break,
            Ok(Inbound::Failed(error)) => return Err(WatcherError::Channel(error)),
            Err(RecvTimeoutError::Timeout) => {
                for frame in monitor.poll()? {
                    writer.write_frame(&frame).map_err(WatcherError::Channel)?;
                }
                next_poll = Instant::now() + poll_interval;
            }
        }
    }

    info!(target: LOG_TARGET, "server closed the channel");
    if reader.join().is_err() {
        warn!(target: LOG_TARGET, "frame reader panicked");
    }
    Ok(())
}

fn read_frames<R: Read>(input: R, sender: &Sender<Inbound>) {
    let mut reader = FrameReader::new(input);
    loop {
        let inbound = match reader.read_frame() {
            Ok(Some(frame)) => Inbound::Frame(frame),
            Ok(None) => Inbound::Closed,
            Err(error) if !error.is_fatal() => {
                warn!(target: LOG_TARGET, %error, "discarding malformed frame");
                continue;
            }
            Err(error) => Inbound::Failed(error),
        };
        let last = !matches!(inbound, Inbound::Frame(_));
        if sender.send(inbound).is_err() || last {
            return;
        }
    }
}

#[cfg(test)]
mod tests;
