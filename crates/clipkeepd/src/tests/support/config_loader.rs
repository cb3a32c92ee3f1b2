//! Configuration loaders for scenarios covering success and failure paths.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use tempfile::TempDir;

use clipkeep_config::{Config, SocketEndpoint, StoragePaths};

use crate::bootstrap::ConfigLoader;

/// Loader that places the socket and the data directory under a temporary
/// directory shared by every clone.
#[derive(Clone)]
pub struct TestConfigLoader {
    root: Arc<TempDir>,
}

impl TestConfigLoader {
    #[must_use]
    pub fn new() -> Self {
        let root = TempDir::new().expect("failed to create temporary directory");
        Self {
            root: Arc::new(root),
        }
    }

    pub fn runtime_dir(&self) -> PathBuf {
        self.root.path().join("run")
    }

    pub fn socket_path(&self) -> PathBuf {
        self.runtime_dir().join("clipkeepd.sock")
    }

    pub fn storage(&self) -> StoragePaths {
        StoragePaths::new(self.root.path().join("data"))
    }

    pub fn history_file(&self, tab: &str) -> PathBuf {
        self.storage()
            .history_dir()
            .join(format!("tab_{tab}.dat"))
    }

    /// Writes `contents` to a file under the data directory, creating it.
    pub fn write_data_file(&self, path: &Path, contents: &[u8]) {
        self.storage().prepare().expect("data directory");
        std::fs::write(path, contents).expect("data file written");
    }
}

fn utf8(path: &Path) -> String {
    path.to_str()
        .expect("temporary path was not valid UTF-8")
        .to_owned()
}

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(Config {
            daemon_socket: SocketEndpoint::unix(utf8(&self.socket_path())),
            data_dir: utf8(self.storage().data_dir()).into(),
            watcher_program: "fake-watcher".to_owned(),
            ..Config::default()
        })
    }
}

/// Loader that intentionally fails by passing an unsupported socket scheme.
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let args = vec![
            OsString::from("clipkeepd"),
            OsString::from("--daemon-socket"),
            OsString::from("invalid://socket"),
        ];
        Config::load_from_iter(args)
    }
}
