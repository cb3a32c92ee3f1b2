//! Server shutdown: signal delivery and the wait for runtime files to go.

use std::io;
use std::thread;
use std::time::{Duration, Instant};

use clipkeep_config::{RuntimePaths, SocketEndpoint};

use super::error::LifecycleError;
use super::socket::server_answers;

#[cfg(unix)]
use libc::{SIGTERM, kill};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Waits until the pid file is gone and the socket stops answering.
pub(super) fn wait_for_shutdown(
    paths: &RuntimePaths,
    endpoint: &SocketEndpoint,
) -> Result<(), LifecycleError> {
    wait_for_shutdown_within(paths, endpoint, SHUTDOWN_TIMEOUT)
}

fn wait_for_shutdown_within(
    paths: &RuntimePaths,
    endpoint: &SocketEndpoint,
    timeout: Duration,
) -> Result<(), LifecycleError> {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        let pid_exists = paths.pid_path().exists();
        let socket_busy = server_answers(endpoint)?;
        if !pid_exists && !socket_busy {
            return Ok(());
        }
        thread::sleep(POLL_INTERVAL);
    }
    Err(LifecycleError::ShutdownTimeout {
        pid_path: paths.pid_path().to_path_buf(),
        timeout,
    })
}

/// Sends SIGTERM; the server saves history and removes its runtime files.
pub(super) fn signal_daemon(pid: u32) -> Result<(), LifecycleError> {
    #[cfg(unix)]
    {
        let Ok(raw) = libc::pid_t::try_from(pid) else {
            return Err(LifecycleError::SignalFailed {
                pid,
                source: io::Error::from(io::ErrorKind::InvalidInput),
            });
        };
        // SAFETY: `kill(2)` is memory-safe for any pid; failures are
        // reported through errno.
        let result = unsafe { kill(raw, SIGTERM) };
        if result == 0 {
            Ok(())
        } else {
            Err(LifecycleError::SignalFailed {
                pid,
                source: io::Error::last_os_error(),
            })
        }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        Err(LifecycleError::UnsupportedPlatform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::support::temp_paths;
    use rstest::rstest;
    use std::fs;
    use std::process::Command;
    use tempfile::TempDir;

    fn socket_of(paths: &RuntimePaths) -> SocketEndpoint {
        let socket = paths.runtime_dir().join("clipkeepd.sock");
        SocketEndpoint::unix(socket.to_str().expect("utf8 path").to_owned())
    }

    #[rstest]
    fn shutdown_completes_once_runtime_files_are_gone(temp_paths: (TempDir, RuntimePaths)) {
        let (_dir, paths) = temp_paths;
        wait_for_shutdown_within(&paths, &socket_of(&paths), Duration::from_secs(1))
            .expect("nothing left to wait for");
    }

    #[rstest]
    fn lingering_pid_file_times_out(temp_paths: (TempDir, RuntimePaths)) {
        let (_dir, paths) = temp_paths;
        fs::write(paths.pid_path(), "1\n").expect("pid file");
        let error = wait_for_shutdown_within(&paths, &socket_of(&paths), Duration::from_millis(250))
            .expect_err("pid file keeps the wait going");
        assert!(matches!(error, LifecycleError::ShutdownTimeout { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn signal_terminates_the_process() {
        let mut child = Command::new("sleep").arg("30").spawn().expect("spawn sleep");
        signal_daemon(child.id()).expect("signal delivered");
        let status = child.wait().expect("reap sleep");
        assert!(!status.success());
    }

    #[cfg(unix)]
    #[test]
    fn signalling_a_dead_process_fails() {
        let mut child = Command::new("true").spawn().expect("spawn true");
        let pid = child.id();
        child.wait().expect("reap true");
        assert!(matches!(
            signal_daemon(pid),
            Err(LifecycleError::SignalFailed { .. })
        ));
    }
}
