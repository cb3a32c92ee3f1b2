//! Files `clipkeepd` keeps while it runs.
//!
//! They live next to a Unix socket, or in the per-user runtime directory
//! when the server listens on TCP. `clipkeep daemon status` and `stop` read
//! what the server writes, so both sides derive the layout here.

use std::env;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::socket::private_dir_builder;
use crate::{Config, SocketEndpoint};

#[cfg(unix)]
use dirs::runtime_dir;

#[cfg(unix)]
use crate::defaults::user_namespace;

const LOCK_FILE: &str = "clipkeepd.lock";
const PID_FILE: &str = "clipkeepd.pid";
const HEALTH_FILE: &str = "clipkeepd.health";
const LOG_FILE: &str = "clipkeepd.log";

/// Runtime directory layout.
#[derive(Debug, Clone)]
pub struct RuntimePaths {
    runtime_dir: PathBuf,
    lock_path: PathBuf,
    pid_path: PathBuf,
    health_path: PathBuf,
    log_path: PathBuf,
}

impl RuntimePaths {
    /// Derives the layout and creates the directory, private to the current
    /// user.
    ///
    /// # Errors
    ///
    /// Fails when the socket path has no parent or the directory cannot be
    /// created.
    pub fn from_config(config: &Config) -> Result<Self, RuntimePathsError> {
        let paths = Self::locate(config)?;
        private_dir_builder()
            .create(&paths.runtime_dir)
            .map_err(|source| RuntimePathsError::RuntimeDirectory {
                path: paths.runtime_dir.clone(),
                source,
            })?;
        Ok(paths)
    }

    /// Derives the layout only. `clipkeep daemon status` must not create
    /// directories.
    ///
    /// # Errors
    ///
    /// Fails when the socket path has no parent.
    pub fn locate(config: &Config) -> Result<Self, RuntimePathsError> {
        Ok(Self::in_directory(runtime_directory(config)?))
    }

    fn in_directory(runtime_dir: PathBuf) -> Self {
        Self {
            lock_path: runtime_dir.join(LOCK_FILE),
            pid_path: runtime_dir.join(PID_FILE),
            health_path: runtime_dir.join(HEALTH_FILE),
            log_path: runtime_dir.join(LOG_FILE),
            runtime_dir,
        }
    }

    /// Directory holding the files below.
    #[must_use]
    pub fn runtime_dir(&self) -> &Path {
        &self.runtime_dir
    }

    /// Exists while a server owns the runtime directory.
    #[must_use]
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Server process id, one line.
    #[must_use]
    pub fn pid_path(&self) -> &Path {
        &self.pid_path
    }

    /// JSON `{status, pid, timestamp}` snapshot.
    #[must_use]
    pub fn health_path(&self) -> &Path {
        &self.health_path
    }

    /// Log output of a server running in the background.
    #[must_use]
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }
}

fn runtime_directory(config: &Config) -> Result<PathBuf, RuntimePathsError> {
    match config.daemon_socket() {
        SocketEndpoint::Unix { path } => path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .map(|parent| parent.as_std_path().to_path_buf())
            .ok_or_else(|| RuntimePathsError::MissingSocketParent {
                path: path.to_string(),
            }),
        SocketEndpoint::Tcp { .. } => Ok(shared_runtime_directory()),
    }
}

/// `$XDG_RUNTIME_DIR/clipkeep`, else a per-user directory under the
/// temporary directory.
fn shared_runtime_directory() -> PathBuf {
    #[cfg(unix)]
    {
        runtime_dir().map_or_else(
            || env::temp_dir().join("clipkeep").join(user_namespace()),
            |dir| dir.join("clipkeep"),
        )
    }

    #[cfg(not(unix))]
    {
        env::temp_dir().join("clipkeep")
    }
}

/// Failures deriving or creating the runtime directory.
#[derive(Debug, Error)]
pub enum RuntimePathsError {
    /// A bare socket file name gives no directory to use.
    #[error("socket path '{path}' has no parent directory")]
    MissingSocketParent {
        /// Configured socket path.
        path: String,
    },
    /// The directory could not be created.
    #[error("failed to prepare runtime directory '{}': {source}", path.display())]
    RuntimeDirectory {
        /// Runtime directory.
        path: PathBuf,
        /// Filesystem error.
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn unix_config(socket: &Path) -> Config {
        Config {
            daemon_socket: SocketEndpoint::unix(
                socket.to_str().expect("utf8 temp path").to_owned(),
            ),
            ..Config::default()
        }
    }

    #[test]
    fn tcp_servers_share_the_user_runtime_directory() {
        let config = Config {
            daemon_socket: SocketEndpoint::tcp("127.0.0.1", 9000),
            ..Config::default()
        };
        let paths = RuntimePaths::locate(&config).expect("tcp layout");
        let dir = paths.runtime_dir();
        assert!(
            dir.ends_with("clipkeep") || dir.parent().is_some_and(|parent| parent.ends_with("clipkeep")),
            "unexpected runtime directory {}",
            dir.display()
        );
    }

    #[rstest]
    #[case(LOCK_FILE)]
    #[case(PID_FILE)]
    #[case(HEALTH_FILE)]
    #[case(LOG_FILE)]
    fn runtime_files_sit_beside_the_unix_socket(#[case] name: &str) {
        let dir = tempfile::tempdir().expect("temp dir");
        let paths = RuntimePaths::locate(&unix_config(&dir.path().join("clipkeepd.sock")))
            .expect("layout");
        let files = [
            paths.lock_path(),
            paths.pid_path(),
            paths.health_path(),
            paths.log_path(),
        ];
        assert!(files.contains(&dir.path().join(name).as_path()));
    }

    #[test]
    fn runtime_directory_is_created_private() {
        let dir = tempfile::tempdir().expect("temp dir");
        let socket = dir.path().join("run").join("clipkeepd.sock");
        let paths = RuntimePaths::from_config(&unix_config(&socket)).expect("layout");
        assert!(paths.runtime_dir().is_dir());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(paths.runtime_dir())
                .expect("metadata")
                .permissions()
                .mode();
            assert_eq!(mode & 0o077, 0);
        }
    }

    #[test]
    fn locating_paths_leaves_the_filesystem_alone() {
        let dir = tempfile::tempdir().expect("temp dir");
        let socket = dir.path().join("absent").join("clipkeepd.sock");
        let paths = RuntimePaths::locate(&unix_config(&socket)).expect("layout");
        assert!(!paths.runtime_dir().exists());
    }

    #[test]
    fn bare_socket_names_have_no_runtime_directory() {
        let config = Config {
            daemon_socket: SocketEndpoint::unix("clipkeepd.sock"),
            ..Config::default()
        };
        assert!(matches!(
            RuntimePaths::from_config(&config),
            Err(RuntimePathsError::MissingSocketParent { .. })
        ));
    }
}
