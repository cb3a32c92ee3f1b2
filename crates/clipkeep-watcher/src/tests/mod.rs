//! Loop-level coverage for the watcher worker.

mod support;

use std::io::Cursor;
use std::time::Duration;

use crate::{WatcherError, run};
use support::MemoryClipboard;

#[test]
fn run_ends_when_the_server_closes_stdin() {
    let result = run(
        Cursor::new(Vec::<u8>::new()),
        Vec::<u8>::new(),
        MemoryClipboard::default(),
        Duration::from_millis(5),
    );
    assert!(result.is_ok(), "run failed: {result:?}");
}

#[test]
fn broken_frame_headers_end_the_run() {
    let result = run(
        Cursor::new(vec![0, 0, 0, 0]),
        Vec::<u8>::new(),
        MemoryClipboard::default(),
        Duration::from_secs(5),
    );
    assert!(matches!(result, Err(WatcherError::Channel(_))));
}
