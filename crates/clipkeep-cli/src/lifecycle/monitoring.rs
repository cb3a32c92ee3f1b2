//! Server health monitoring.
//!
//! Reads the health snapshot and pid file `clipkeepd` keeps in its runtime
//! directory and polls the snapshot while a freshly spawned server starts.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Child;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use clipkeep_config::RuntimePaths;
use serde::Deserialize;

use super::error::LifecycleError;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Lifecycle stage reported in the health snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum DaemonStatus {
    Starting,
    Ready,
    Stopping,
}

impl fmt::Display for DaemonStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => formatter.write_str("starting"),
            Self::Ready => formatter.write_str("ready"),
            Self::Stopping => formatter.write_str("stopping"),
        }
    }
}

/// Contents of `clipkeepd.health`.
#[derive(Debug, Deserialize, PartialEq, Eq)]
pub(crate) struct HealthSnapshot {
    pub(crate) status: DaemonStatus,
    pub(crate) pid: u32,
    /// Seconds since the Unix epoch.
    pub(crate) timestamp: u64,
}

#[derive(Debug, PartialEq, Eq)]
enum HealthCheckOutcome {
    Ready(HealthSnapshot),
    Aborted { path: PathBuf },
    Continue,
}

#[derive(Debug, Clone, Copy)]
struct ProcessMonitorContext {
    started_at: SystemTime,
    expected_pid: u32,
    daemonized: bool,
}

/// Waits for a fresh `ready` snapshot from the spawned server.
///
/// A spawned process that exits with status 0 has forked into the
/// background; from then on the snapshot pid no longer matches the child
/// and only the timestamp identifies a fresh snapshot.
pub(super) fn wait_for_ready(
    paths: &RuntimePaths,
    child: &mut Child,
    started_at: SystemTime,
    timeout: Duration,
) -> Result<HealthSnapshot, LifecycleError> {
    let deadline = Instant::now() + timeout;
    let expected_pid = child.id();
    let mut daemonized = false;
    while Instant::now() < deadline {
        // Child status first, so a fork is noticed before the pid check.
        if let Some(status) = child
            .try_wait()
            .map_err(|source| LifecycleError::MonitorChild { source })?
        {
            if !status.success() {
                return Err(LifecycleError::StartupFailed {
                    exit_status: status.code(),
                });
            }
            daemonized = true;
        }
        let monitor = ProcessMonitorContext {
            started_at,
            expected_pid,
            daemonized,
        };
        match check_health_snapshot(paths, monitor)? {
            HealthCheckOutcome::Ready(snapshot) => return Ok(snapshot),
            HealthCheckOutcome::Aborted { path } => {
                return Err(LifecycleError::StartupAborted { path });
            }
            HealthCheckOutcome::Continue => {}
        }
        thread::sleep(POLL_INTERVAL);
    }
    Err(LifecycleError::StartupTimeout {
        health_path: paths.health_path().to_path_buf(),
        timeout_ms: timeout.as_millis(),
    })
}

/// Reads the health snapshot. A missing file is `Ok(None)`.
pub(super) fn read_health(path: &Path) -> Result<Option<HealthSnapshot>, LifecycleError> {
    let Some(content) = read_optional(path)? else {
        return Ok(None);
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|fault| LifecycleError::runtime_file(path, fault))
}

/// Reads the pid file. A missing or empty file is `Ok(None)`.
pub(super) fn read_pid(path: &Path) -> Result<Option<u32>, LifecycleError> {
    let Some(content) = read_optional(path)? else {
        return Ok(None);
    };
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<u32>()
        .map(Some)
        .map_err(|fault| LifecycleError::runtime_file(path, fault))
}

fn read_optional(path: &Path) -> Result<Option<String>, LifecycleError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(error) => Err(LifecycleError::runtime_file(path, error)),
    }
}

fn check_health_snapshot(
    paths: &RuntimePaths,
    monitor: ProcessMonitorContext,
) -> Result<HealthCheckOutcome, LifecycleError> {
    let Some(snapshot) = read_health(paths.health_path())? else {
        return Ok(HealthCheckOutcome::Continue);
    };
    let pid_ok = monitor.daemonized || snapshot.pid == monitor.expected_pid;
    if !pid_ok || !snapshot_is_recent(&snapshot, monitor.started_at)? {
        return Ok(HealthCheckOutcome::Continue);
    }
    match snapshot.status {
        DaemonStatus::Ready => Ok(HealthCheckOutcome::Ready(snapshot)),
        DaemonStatus::Stopping => Ok(HealthCheckOutcome::Aborted {
            path: paths.health_path().to_path_buf(),
        }),
        DaemonStatus::Starting => Ok(HealthCheckOutcome::Continue),
    }
}

fn snapshot_is_recent(
    snapshot: &HealthSnapshot,
    started_at: SystemTime,
) -> Result<bool, LifecycleError> {
    // Snapshot timestamps have whole-second precision.
    let started_secs = started_at
        .duration_since(UNIX_EPOCH)
        .map_err(|_| LifecycleError::InvalidSystemClock { time: started_at })?
        .as_secs();
    Ok(snapshot.timestamp >= started_secs)
}

#[cfg(test)]
mod tests {
    use super::super::error::RuntimeFileFault;
    use super::*;
    use crate::tests::support::{temp_paths, write_health_snapshot};
    use rstest::rstest;
    use std::process::Command;
    use tempfile::TempDir;

    fn now_secs() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock after epoch")
            .as_secs()
    }

    #[rstest]
    fn read_pid_handles_missing_and_empty_files(temp_paths: (TempDir, RuntimePaths)) {
        let (_dir, paths) = temp_paths;
        assert_eq!(read_pid(paths.pid_path()).expect("missing pid"), None);
        fs::write(paths.pid_path(), "\n").expect("write pid");
        assert_eq!(read_pid(paths.pid_path()).expect("empty pid"), None);
        fs::write(paths.pid_path(), "42\n").expect("write pid");
        assert_eq!(read_pid(paths.pid_path()).expect("pid"), Some(42));
    }

    #[rstest]
    fn read_pid_rejects_garbage(temp_paths: (TempDir, RuntimePaths)) {
        let (_dir, paths) = temp_paths;
        fs::write(paths.pid_path(), "nope").expect("write pid");
        assert!(matches!(
            read_pid(paths.pid_path()),
            Err(LifecycleError::RuntimeFile {
                fault: RuntimeFileFault::Pid(_),
                ..
            })
        ));
    }

    #[rstest]
    fn garbled_health_snapshot_is_reported(temp_paths: (TempDir, RuntimePaths)) {
        let (_dir, paths) = temp_paths;
        fs::write(paths.health_path(), "{not json").expect("write health");
        assert!(matches!(
            read_health(paths.health_path()),
            Err(LifecycleError::RuntimeFile {
                fault: RuntimeFileFault::Health(_),
                ..
            })
        ));
    }

    #[rstest]
    fn read_health_parses_snapshot(temp_paths: (TempDir, RuntimePaths)) {
        let (_dir, paths) = temp_paths;
        write_health_snapshot(&paths, "ready", 7, 11);
        let snapshot = read_health(paths.health_path())
            .expect("read health")
            .expect("snapshot present");
        assert_eq!(
            snapshot,
            HealthSnapshot {
                status: DaemonStatus::Ready,
                pid: 7,
                timestamp: 11,
            }
        );
    }

    #[rstest]
    #[case(10, 20, false)]
    #[case(20, 20, true)]
    #[case(30, 20, true)]
    fn snapshots_older_than_the_launch_are_stale(
        #[case] timestamp: u64,
        #[case] started: u64,
        #[case] expected: bool,
    ) {
        let snapshot = HealthSnapshot {
            status: DaemonStatus::Ready,
            pid: 1,
            timestamp,
        };
        let started_at = UNIX_EPOCH + Duration::from_secs(started) + Duration::from_millis(900);
        assert_eq!(
            snapshot_is_recent(&snapshot, started_at).expect("clock"),
            expected
        );
    }

    #[rstest]
    fn ready_snapshot_after_fork_completes_startup(temp_paths: (TempDir, RuntimePaths)) {
        let (_dir, paths) = temp_paths;
        let started_at = SystemTime::now();
        write_health_snapshot(&paths, "ready", 4242, now_secs());
        let mut child = Command::new("true").spawn().expect("spawn true");
        let snapshot = wait_for_ready(&paths, &mut child, started_at, Duration::from_secs(5))
            .expect("server ready");
        assert_eq!(snapshot.pid, 4242);
    }

    #[rstest]
    fn failing_child_aborts_startup(temp_paths: (TempDir, RuntimePaths)) {
        let (_dir, paths) = temp_paths;
        let mut child = Command::new("false").spawn().expect("spawn false");
        let error = wait_for_ready(&paths, &mut child, SystemTime::now(), Duration::from_secs(5))
            .expect_err("startup fails");
        assert!(matches!(
            error,
            LifecycleError::StartupFailed {
                exit_status: Some(1)
            }
        ));
    }

    #[rstest]
    fn stopping_snapshot_aborts_startup(temp_paths: (TempDir, RuntimePaths)) {
        let (_dir, paths) = temp_paths;
        let started_at = SystemTime::now();
        write_health_snapshot(&paths, "stopping", 4242, now_secs());
        let mut child = Command::new("true").spawn().expect("spawn true");
        let error = wait_for_ready(&paths, &mut child, started_at, Duration::from_secs(5))
            .expect_err("startup aborted");
        assert!(matches!(error, LifecycleError::StartupAborted { .. }));
    }

    #[rstest]
    fn missing_snapshot_times_out(temp_paths: (TempDir, RuntimePaths)) {
        let (_dir, paths) = temp_paths;
        let mut child = Command::new("sleep").arg("5").spawn().expect("spawn sleep");
        let result = wait_for_ready(
            &paths,
            &mut child,
            SystemTime::now(),
            Duration::from_millis(300),
        );
        child.kill().expect("kill sleep");
        child.wait().expect("reap sleep");
        assert!(matches!(
            result,
            Err(LifecycleError::StartupTimeout { .. })
        ));
    }
}
