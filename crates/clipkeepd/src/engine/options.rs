//! Runtime options changed through the `config` command.
//!
//! Options persist in `settings.toml` under the data directory. A missing
//! file means defaults; a file that does not parse stops the server from
//! starting rather than silently discarding the user's settings.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use clipkeep_types::channel::WatcherSettings;
use regex::Regex;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};
use thiserror::Error;

use crate::files::atomic_write;

/// Names accepted by `config`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumIter, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum OptionName {
    /// Items kept per tab.
    Maxitems,
    /// Items shown in the tray menu.
    TrayItems,
    /// Pattern of texts never stored.
    Ignore,
    /// Formats kept from snapshots, in priority order.
    Formats,
    /// Editor command; `%1` is the file to edit.
    Editor,
    /// Store clipboard changes.
    CheckClipboard,
    /// Store selection changes.
    CheckSelection,
    /// Mirror selection into clipboard.
    CopyClipboard,
    /// Mirror clipboard into selection.
    CopySelection,
    /// Ask before exiting from the user interface.
    ConfirmExit,
    /// Tab order.
    Tabs,
}

impl OptionName {
    /// True when changing the option alters what the watcher reports.
    #[must_use]
    pub const fn affects_watcher(self) -> bool {
        matches!(
            self,
            Self::Formats
                | Self::CheckClipboard
                | Self::CheckSelection
                | Self::CopyClipboard
                | Self::CopySelection
        )
    }
}

/// Failures loading or saving the options file.
#[derive(Debug, Error)]
pub enum OptionsError {
    /// The file exists but could not be read.
    #[error("failed to read options file '{path}': {source}")]
    Read {
        /// Options file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// The file is not valid options TOML.
    #[error("failed to parse options file '{path}': {source}")]
    Parse {
        /// Options file.
        path: PathBuf,
        /// Parser error.
        #[source]
        source: Box<toml::de::Error>,
    },
    /// The options could not be serialised.
    #[error("failed to serialise options: {0}")]
    Serialize(#[from] toml::ser::Error),
    /// The file could not be written.
    #[error("failed to write options file '{path}': {source}")]
    Write {
        /// Options file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
}

/// A rejected `config` assignment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct InvalidValue {
    /// Why the value was rejected.
    pub message: String,
}

impl InvalidValue {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Option values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Options {
    /// Items kept per tab.
    pub maxitems: usize,
    /// Items shown in the tray menu.
    pub tray_items: usize,
    /// Pattern of texts never stored; empty disables the check.
    pub ignore: String,
    /// Formats kept from snapshots, in priority order.
    pub formats: Vec<String>,
    /// Editor command.
    pub editor: String,
    /// Store clipboard changes.
    pub check_clipboard: bool,
    /// Store selection changes.
    pub check_selection: bool,
    /// Mirror selection into clipboard.
    pub copy_clipboard: bool,
    /// Mirror clipboard into selection.
    pub copy_selection: bool,
    /// Ask before exiting from the user interface.
    pub confirm_exit: bool,
    /// Tab order.
    pub tabs: Vec<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            maxitems: 200,
            tray_items: 5,
            ignore: r"^\s*$".to_owned(),
            formats: [
                "image/bmp",
                "image/x-inkscape-svg-compressed",
                "text/plain",
                "text/html",
            ]
            .map(str::to_owned)
            .to_vec(),
            editor: "gedit %1".to_owned(),
            check_clipboard: true,
            check_selection: true,
            copy_clipboard: true,
            copy_selection: true,
            confirm_exit: true,
            tabs: Vec::new(),
        }
    }
}

impl Options {
    /// Reads the options file; a missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, OptionsError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(OptionsError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        toml::from_str(&text).map_err(|source| OptionsError::Parse {
            path: path.to_path_buf(),
            source: Box::new(source),
        })
    }

    /// Writes the options file atomically.
    ///
    /// # Errors
    ///
    /// Fails when the options cannot be serialised or written.
    pub fn save(&self, path: &Path) -> Result<(), OptionsError> {
        let text = toml::to_string(self)?;
        atomic_write(path, text.as_bytes()).map_err(|source| OptionsError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Compiled `ignore` pattern, `None` when empty.
    ///
    /// # Errors
    ///
    /// Fails when the pattern does not compile.
    pub fn ignore_pattern(&self) -> Result<Option<Regex>, regex::Error> {
        if self.ignore.is_empty() {
            return Ok(None);
        }
        Regex::new(&self.ignore).map(Some)
    }

    /// Settings pushed to the watcher.
    #[must_use]
    pub fn watcher_settings(&self) -> WatcherSettings {
        WatcherSettings {
            formats: self.formats.clone(),
            check_clipboard: self.check_clipboard,
            check_selection: self.check_selection,
            copy_clipboard: self.copy_clipboard,
            copy_selection: self.copy_selection,
        }
    }

    /// Textual value of an option as shown by `config`.
    #[must_use]
    pub fn get(&self, name: OptionName) -> String {
        match name {
            OptionName::Maxitems => self.maxitems.to_string(),
            OptionName::TrayItems => self.tray_items.to_string(),
            OptionName::Ignore => self.ignore.clone(),
            OptionName::Formats => self.formats.join(","),
            OptionName::Editor => self.editor.clone(),
            OptionName::CheckClipboard => self.check_clipboard.to_string(),
            OptionName::CheckSelection => self.check_selection.to_string(),
            OptionName::CopyClipboard => self.copy_clipboard.to_string(),
            OptionName::CopySelection => self.copy_selection.to_string(),
            OptionName::ConfirmExit => self.confirm_exit.to_string(),
            OptionName::Tabs => self.tabs.join(","),
        }
    }

    /// Parses and assigns a value. The options are unchanged on error.
    ///
    /// # Errors
    ///
    /// Fails when the value does not parse for the option.
    pub fn set(&mut self, name: OptionName, value: &str) -> Result<(), InvalidValue> {
        match name {
            OptionName::Maxitems => self.maxitems = parse_count(value)?,
            OptionName::TrayItems => self.tray_items = parse_number(value)?,
            OptionName::Ignore => {
                Regex::new(value).map_err(|error| InvalidValue::new(error.to_string()))?;
                value.clone_into(&mut self.ignore);
            }
            OptionName::Formats => self.formats = parse_list(value),
            OptionName::Editor => {
                if value.trim().is_empty() {
                    return Err(InvalidValue::new("editor command must not be empty"));
                }
                value.clone_into(&mut self.editor);
            }
            OptionName::CheckClipboard => self.check_clipboard = parse_flag(value)?,
            OptionName::CheckSelection => self.check_selection = parse_flag(value)?,
            OptionName::CopyClipboard => self.copy_clipboard = parse_flag(value)?,
            OptionName::CopySelection => self.copy_selection = parse_flag(value)?,
            OptionName::ConfirmExit => self.confirm_exit = parse_flag(value)?,
            OptionName::Tabs => {
                let tabs = parse_list(value);
                if tabs.is_empty() {
                    return Err(InvalidValue::new("at least one tab is required"));
                }
                self.tabs = tabs;
            }
        }
        Ok(())
    }

    /// `name=value` lines for every option, in declaration order.
    #[must_use]
    pub fn listing(&self) -> String {
        OptionName::iter()
            .map(|name| format!("{name}={}\n", self.get(name)))
            .collect()
    }
}

/// Parses an option name.
///
/// # Errors
///
/// Fails for names that are not options.
pub fn parse_name(name: &str) -> Result<OptionName, InvalidValue> {
    OptionName::from_str(name).map_err(|_| InvalidValue::new("unknown option"))
}

fn parse_number(value: &str) -> Result<usize, InvalidValue> {
    value
        .trim()
        .parse()
        .map_err(|_| InvalidValue::new(format!("'{value}' is not a non-negative number")))
}

fn parse_count(value: &str) -> Result<usize, InvalidValue> {
    match parse_number(value)? {
        0 => Err(InvalidValue::new("value must be at least 1")),
        count => Ok(count),
    }
}

fn parse_flag(value: &str) -> Result<bool, InvalidValue> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(InvalidValue::new(format!("'{value}' is not a boolean"))),
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_owned)
        .collect()
}
