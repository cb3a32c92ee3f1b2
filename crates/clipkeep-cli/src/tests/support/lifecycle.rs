//! Lifecycle doubles and runtime directory fixtures.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::io::Write;
use std::process::ExitCode;

use clipkeep_config::{Config, RuntimePaths, SocketEndpoint};
use rstest::fixture;
use tempfile::TempDir;

use crate::cli::DaemonAction;
use crate::lifecycle::{LifecycleContext, LifecycleError, LifecycleOutput};

/// Records lifecycle invocations and replays queued results.
#[derive(Default)]
pub(in crate::tests) struct TestLifecycle {
    calls: RefCell<Vec<DaemonAction>>,
    responses: RefCell<VecDeque<Result<ExitCode, LifecycleError>>>,
}

impl TestLifecycle {
    pub fn calls(&self) -> Vec<DaemonAction> {
        self.calls.borrow().clone()
    }

    pub fn enqueue(&self, result: Result<ExitCode, LifecycleError>) {
        self.responses.borrow_mut().push_back(result);
    }

    pub fn handle<W: Write, E: Write>(
        &self,
        action: DaemonAction,
        _context: LifecycleContext<'_>,
        _output: &mut LifecycleOutput<W, E>,
    ) -> Result<ExitCode, LifecycleError> {
        self.calls.borrow_mut().push(action);
        self.responses
            .borrow_mut()
            .pop_front()
            .unwrap_or(Ok(ExitCode::SUCCESS))
    }
}

/// Temporary runtime directory holding a `clipkeepd.sock` endpoint.
///
/// The `TempDir` must outlive the returned paths.
#[fixture]
pub(crate) fn temp_paths() -> (TempDir, RuntimePaths) {
    let dir = TempDir::new().expect("temp dir");
    let socket = dir.path().join("clipkeepd.sock");
    let config = Config {
        daemon_socket: SocketEndpoint::unix(socket.to_string_lossy().into_owned()),
        ..Config::default()
    };
    let paths = RuntimePaths::from_config(&config).expect("runtime paths");
    (dir, paths)
}

/// Writes a health snapshot the way `clipkeepd` does.
pub(crate) fn write_health_snapshot(paths: &RuntimePaths, status: &str, pid: u32, timestamp: u64) {
    let snapshot = serde_json::json!({
        "status": status,
        "pid": pid,
        "timestamp": timestamp,
    });
    let json = serde_json::to_string(&snapshot).expect("serialise health snapshot");
    fs::write(paths.health_path(), json).expect("write health snapshot");
}
