//! External editor sessions for the `edit` command.
//!
//! The item text is written to a temporary file, the configured editor runs
//! on it through the chain executor, and the file is read back once the
//! editor exits. The result returns to the owner as an
//! [`EngineEvent::EditFinished`] event; nothing is changed while the editor
//! is open.

use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};

use clipkeep_types::MimeData;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::{ENGINE_TARGET, EngineEvent};
use crate::rules::command_line::{CommandLineError, split_words};
use crate::rules::{CancelToken, ChainExecutor, ChainRequest};

/// What an edited text replaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EditTarget {
    /// A new item for the tab.
    New {
        /// Destination tab.
        tab: String,
    },
    /// An existing item.
    Row {
        /// Tab holding the item.
        tab: String,
        /// Row when editing started.
        row: usize,
        /// Content when editing started.
        original: MimeData,
    },
    /// The current clipboard content.
    Clipboard,
}

/// Builds the editor argv: `%1` becomes the file path, or the path is
/// appended when the command has no placeholder.
pub(super) fn editor_request(editor: &str, path: &Path) -> Result<ChainRequest, CommandLineError> {
    let file = path.to_string_lossy();
    let mut argv = split_words(editor)?;
    if argv.iter().any(|word| word.contains("%1")) {
        for word in &mut argv {
            *word = word.replace("%1", &file);
        }
    } else {
        argv.push(file.into_owned());
    }
    Ok(ChainRequest {
        stages: vec![argv],
        input: None,
        timeout: None,
    })
}

struct EditorRun {
    cancel: CancelToken,
    thread: JoinHandle<()>,
}

#[derive(Default)]
pub(super) struct Editors {
    runs: Vec<EditorRun>,
}

impl Editors {
    /// Opens the editor on `text` in the background.
    pub(super) fn open(
        &mut self,
        editor: &str,
        text: &str,
        target: EditTarget,
        executor: Arc<dyn ChainExecutor>,
        events: Sender<EngineEvent>,
    ) -> io::Result<()> {
        let mut file = tempfile::Builder::new()
            .prefix("clipkeep-edit-")
            .suffix(".txt")
            .tempfile()?;
        file.write_all(text.as_bytes())?;
        file.flush()?;
        let request = editor_request(editor, file.path())
            .map_err(|error| io::Error::new(io::ErrorKind::InvalidInput, error))?;
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let thread = thread::Builder::new()
            .name("clipkeep-editor".to_owned())
            .spawn(move || {
                let result = edit(&file, &request, executor.as_ref(), &token);
                if events
                    .send(EngineEvent::EditFinished { target, result })
                    .is_err()
                {
                    debug!(target: ENGINE_TARGET, "engine gone before editor closed");
                }
            })?;
        self.runs.push(EditorRun { cancel, thread });
        Ok(())
    }

    /// Joins editor threads that have exited.
    pub(super) fn reap(&mut self) {
        let (finished, open): (Vec<_>, Vec<_>) = std::mem::take(&mut self.runs)
            .into_iter()
            .partition(|run| run.thread.is_finished());
        self.runs = open;
        finished.into_iter().for_each(join);
    }

    pub(super) fn stop_all(&mut self) {
        for run in &self.runs {
            run.cancel.cancel();
        }
        std::mem::take(&mut self.runs).into_iter().for_each(join);
    }
}

fn edit(
    file: &NamedTempFile,
    request: &ChainRequest,
    executor: &dyn ChainExecutor,
    cancel: &CancelToken,
) -> Result<String, String> {
    let output = executor.run(request, cancel);
    if !output.succeeded() {
        return Err(output.describe());
    }
    fs::read(file.path())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .map_err(|error| error.to_string())
}

fn join(run: EditorRun) {
    if run.thread.join().is_err() {
        warn!(target: ENGINE_TARGET, "editor thread panicked");
    }
}
