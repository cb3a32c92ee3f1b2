//! Derives the persistent storage layout under the data directory.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::Config;
use crate::socket::private_dir_builder;

const HISTORY_DIRECTORY: &str = "history";
const OPTIONS_FILE: &str = "settings.toml";
const RULES_FILE: &str = "rules.toml";

/// Locations of the history files, the options file and the rules file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePaths {
    data_dir: PathBuf,
    history_dir: PathBuf,
    options_path: PathBuf,
    rules_path: PathBuf,
}

impl StoragePaths {
    /// Derives the layout rooted at `data_dir` without touching the
    /// filesystem.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            history_dir: data_dir.join(HISTORY_DIRECTORY),
            options_path: data_dir.join(OPTIONS_FILE),
            rules_path: data_dir.join(RULES_FILE),
            data_dir,
        }
    }

    /// Derives the layout from configuration and creates the data and history
    /// directories with owner-only permissions.
    ///
    /// # Errors
    ///
    /// Fails when a directory cannot be created.
    pub fn from_config(config: &Config) -> Result<Self, StoragePathsError> {
        let paths = Self::new(config.data_dir().as_std_path());
        paths.prepare()?;
        Ok(paths)
    }

    /// Creates the directories if they are missing.
    ///
    /// # Errors
    ///
    /// Fails when a directory cannot be created.
    pub fn prepare(&self) -> Result<(), StoragePathsError> {
        private_dir_builder()
            .create(&self.history_dir)
            .map_err(|source| StoragePathsError::CreateDirectory {
                path: self.history_dir.clone(),
                source,
            })
    }

    /// Data directory root.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Directory holding one history file per tab.
    #[must_use]
    pub fn history_dir(&self) -> &Path {
        &self.history_dir
    }

    /// Runtime options file.
    #[must_use]
    pub fn options_path(&self) -> &Path {
        &self.options_path
    }

    /// Automation rules file.
    #[must_use]
    pub fn rules_path(&self) -> &Path {
        &self.rules_path
    }
}

/// Errors raised while preparing storage directories.
#[derive(Debug, Error)]
pub enum StoragePathsError {
    /// A directory could not be created.
    #[error("failed to prepare storage directory '{path}': {source}")]
    CreateDirectory {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: std::io::Error,
    },
}
