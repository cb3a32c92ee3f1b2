//! The engine thread's state and event loop.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use clipkeep_types::session::Notification;
use clipkeep_types::{MimeData, Source};
use regex::Regex;
use tracing::{debug, info, warn};

use super::actions::ActionTable;
use super::arguments::Arguments;
use super::commands::Context;
use super::editor::{EditTarget, Editors};
use super::notify::Subscribers;
use super::options::Options;
use super::{ClipboardMonitor, ENGINE_TARGET, EngineEvent, EngineParts, Reply, ReplySender};
use crate::dispatch::DispatchError;
use crate::history::{CommitOutcome, HistoryError, HistoryStore};
use crate::rules::{
    ActionSpec, ActionTarget, ChainExecutor, ChainOutput, CommitGroup, PipelineJob, PipelineOutcome,
    PipelineWorker, RuleSet, split_output,
};
use crate::watcher::{Snapshot, WatcherState};

/// Unsaved history is written this long after the first change.
pub(super) const SAVE_DELAY: Duration = Duration::from_secs(120);

pub(super) struct Owner {
    pub(super) history: HistoryStore,
    pub(super) options: Options,
    pub(super) options_path: PathBuf,
    pub(super) ignore: Option<Regex>,
    pub(super) rules: Arc<RuleSet>,
    pub(super) clipboard: MimeData,
    pub(super) selection: MimeData,
    pub(super) monitoring: bool,
    pub(super) monitor: Box<dyn ClipboardMonitor>,
    pub(super) executor: Arc<dyn ChainExecutor>,
    pub(super) actions: ActionTable,
    pub(super) editors: Editors,
    pub(super) events: Sender<EngineEvent>,
    pub(super) current_row: usize,
    pub(super) on_exit: Box<dyn Fn() + Send>,
    subscribers: Subscribers,
    worker: PipelineWorker,
    warnings: Vec<String>,
    save_deadline: Option<Instant>,
}

impl Owner {
    pub(super) fn new(parts: EngineParts, worker: PipelineWorker, events: Sender<EngineEvent>) -> Self {
        let EngineParts {
            history,
            options,
            options_path,
            rules,
            monitor,
            executor,
            on_exit,
            mut warnings,
        } = parts;
        let ignore = options.ignore_pattern().unwrap_or_else(|error| {
            warnings.push(format!("ignore pattern disabled: {error}"));
            None
        });
        Self {
            history,
            options,
            options_path,
            ignore,
            rules: Arc::new(rules),
            clipboard: MimeData::new(),
            selection: MimeData::new(),
            monitoring: true,
            monitor,
            executor,
            actions: ActionTable::default(),
            editors: Editors::default(),
            events,
            current_row: 0,
            on_exit,
            subscribers: Subscribers::default(),
            worker,
            warnings,
            save_deadline: None,
        }
    }

    /// Handles events until shutdown, then stops actions and editors and
    /// saves. Hands the pipeline worker back so the caller can join it once
    /// the inbox is gone.
    pub(super) fn run(mut self, inbox: &Receiver<EngineEvent>) -> PipelineWorker {
        info!(
            target: ENGINE_TARGET,
            tabs = self.history.tab_names().len(),
            rules = self.rules.rules().len(),
            "engine started"
        );
        loop {
            let event = match self.save_deadline {
                Some(deadline) => {
                    match inbox.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                        Ok(event) => event,
                        Err(RecvTimeoutError::Timeout) => {
                            self.save_history();
                            continue;
                        }
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                None => match inbox.recv() {
                    Ok(event) => event,
                    Err(_) => break,
                },
            };
            if !self.handle(event) {
                break;
            }
            self.schedule_save();
        }
        self.finish();
        self.worker
    }

    fn handle(&mut self, event: EngineEvent) -> bool {
        match event {
            EngineEvent::Command {
                command,
                arguments,
                reply,
            } => self.handle_command(&command, arguments, reply),
            EngineEvent::Subscribe(sender) => self.subscribe(sender),
            EngineEvent::Snapshot(snapshot) => self.ingest(snapshot),
            EngineEvent::WatcherState(state) => self.watcher_state(state),
            EngineEvent::PipelineFinished { outcome, ack } => {
                self.apply_outcome(outcome);
                if ack.send(()).is_err() {
                    debug!(target: ENGINE_TARGET, "pipeline worker gone");
                }
            }
            EngineEvent::ActionFinished { id, output } => self.action_finished(id, output),
            EngineEvent::EditFinished { target, result } => self.edit_finished(target, result),
            EngineEvent::Shutdown => return false,
        }
        true
    }

    fn handle_command(&mut self, command: &str, arguments: Vec<Vec<u8>>, reply: ReplySender) {
        debug!(target: ENGINE_TARGET, command, arguments = arguments.len(), "command received");
        let mut context = Context::new(self.history.default_tab().to_owned(), Some(reply));
        let result = self.execute(&mut context, command, Arguments::new(arguments));
        if let Err(error) = &result {
            debug!(target: ENGINE_TARGET, command, %error, "command failed");
        }
        if let Some(reply) = context.reply.take()
            && reply.send(result).is_err()
        {
            debug!(target: ENGINE_TARGET, command, "session closed before reply");
        }
    }

    fn subscribe(&mut self, sender: Sender<Notification>) {
        for message in &self.warnings {
            let warning = Notification::Warning {
                message: message.clone(),
            };
            if sender.send(warning).is_err() {
                return;
            }
        }
        self.subscribers.add(sender);
        debug!(target: ENGINE_TARGET, subscribers = self.subscribers.len(), "session subscribed");
    }

    pub(super) fn notify(&mut self, event: Notification) {
        self.subscribers.broadcast(&event);
    }

    /// Parks `spec` for confirmation and tells subscribers about it and
    /// about any pending action that expired to make room.
    pub(super) fn queue_action(&mut self, spec: ActionSpec) -> u64 {
        let command = spec.command_line();
        let name = spec.name.clone();
        let queued = self.actions.queue(spec);
        if let Some(expired) = queued.expired {
            self.notify(Notification::ActionFinished {
                id: expired,
                outcome: "expired".to_owned(),
            });
        }
        self.notify(Notification::ActionPending {
            id: queued.id,
            name,
            command,
        });
        queued.id
    }

    pub(super) fn warn_clients(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(target: ENGINE_TARGET, %message, "warning sent to clients");
        self.notify(Notification::Warning { message });
    }

    pub(super) fn items_changed(&mut self, tab: &str) {
        let count = self.history.len(tab).unwrap_or_default();
        self.notify(Notification::ItemsChanged {
            tab: tab.to_owned(),
            count,
        });
    }

    /// Records the live tab order in the options file and tells clients.
    pub(super) fn tabs_changed(&mut self) {
        let tabs = self.history.tab_names();
        self.options.tabs.clone_from(&tabs);
        if let Err(error) = self.options.save(&self.options_path) {
            self.warn_clients(error.to_string());
        }
        self.notify(Notification::TabsChanged { tabs });
    }

    /// Creates `tab` on first use.
    pub(super) fn ensure_tab(&mut self, tab: &str) -> Result<(), HistoryError> {
        if self.history.ensure_tab(tab)? {
            self.tabs_changed();
        }
        Ok(())
    }

    /// Commits `items` to the top of `tab` in order, so the last one ends
    /// up newest. Returns how many were stored.
    pub(super) fn commit_items(&mut self, tab: &str, items: Vec<MimeData>) -> Result<usize, HistoryError> {
        self.ensure_tab(tab)?;
        let mut stored = 0;
        for item in items {
            if let CommitOutcome::Committed(_) = self.history.commit(tab, item)? {
                stored += 1;
            }
        }
        if stored > 0 {
            self.items_changed(tab);
        }
        Ok(stored)
    }

    /// Places `data` on the clipboard through the watcher.
    pub(super) fn set_clipboard(&self, source: Source, data: MimeData) -> Result<(), DispatchError> {
        self.monitor.set_content(source, data)?;
        Ok(())
    }

    pub(super) const fn cached(&self, source: Source) -> &MimeData {
        match source {
            Source::Clipboard => &self.clipboard,
            Source::Selection => &self.selection,
        }
    }

    const fn checks(&self, source: Source) -> bool {
        match source {
            Source::Clipboard => self.options.check_clipboard,
            Source::Selection => self.options.check_selection,
        }
    }

    fn ingest(&mut self, snapshot: Snapshot) {
        let Snapshot {
            source,
            window_title,
            data,
        } = snapshot;
        match source {
            Source::Clipboard => self.clipboard.clone_from(&data),
            Source::Selection => self.selection.clone_from(&data),
        }
        self.notify(Notification::ClipboardChanged {
            source,
            text: data.text(),
        });
        if !self.monitoring || !self.checks(source) {
            return;
        }
        let data = data.filtered(&self.options.formats);
        if data.is_blank() {
            return;
        }
        if let (Some(pattern), Some(text)) = (&self.ignore, data.text())
            && pattern.is_match(&text)
        {
            debug!(target: ENGINE_TARGET, %source, "snapshot matches ignore pattern");
            return;
        }
        let default_tab = self.history.default_tab().to_owned();
        if self
            .history
            .get(&default_tab, 0)
            .is_ok_and(|newest| newest.same_content(&data))
        {
            return;
        }
        let job = PipelineJob {
            snapshot: Snapshot {
                source,
                window_title,
                data,
            },
            rules: Arc::clone(&self.rules),
        };
        if !self.worker.submit(job) {
            warn!(target: ENGINE_TARGET, "pipeline worker stopped; snapshot dropped");
        }
    }

    fn watcher_state(&mut self, state: WatcherState) {
        if state != WatcherState::GaveUp {
            return;
        }
        let message = "cannot start clipboard monitor".to_owned();
        if !self.warnings.contains(&message) {
            self.warnings.push(message.clone());
        }
        self.warn_clients(message);
    }

    fn apply_outcome(&mut self, outcome: PipelineOutcome) {
        let group = match outcome {
            PipelineOutcome::Commit(group) => group,
            PipelineOutcome::Ignored { rule } => {
                debug!(target: ENGINE_TARGET, %rule, "snapshot dropped by rule");
                return;
            }
            PipelineOutcome::Cancelled => return,
        };
        if let Err(error) = self.commit_group(group) {
            self.warn_clients(error.to_string());
        }
    }

    fn commit_group(&mut self, group: CommitGroup) -> Result<(), DispatchError> {
        let CommitGroup {
            item,
            created,
            scripts,
            pending,
            failures,
        } = group;
        let default_tab = self.history.default_tab().to_owned();
        self.commit_items(&default_tab, vec![item])?;
        self.current_row = 0;
        for created in created {
            let tab = created.tab.unwrap_or_else(|| default_tab.clone());
            self.commit_items(&tab, created.items)?;
        }
        for spec in pending {
            self.queue_action(spec);
        }
        for failure in failures {
            self.warn_clients(format!("rule '{}' {}", failure.rule, failure.output.describe()));
        }
        for script in scripts {
            let mut context = Context::new(default_tab.clone(), None);
            if let Err(error) = self.eval_script(&mut context, &script) {
                self.warn_clients(format!("rule script failed: {error}"));
            }
        }
        Ok(())
    }

    fn action_finished(&mut self, id: u64, output: ChainOutput) {
        let Some(finished) = self.actions.finish(id) else {
            return;
        };
        let outcome = output.describe();
        info!(target: ENGINE_TARGET, id, %outcome, "action finished");
        let applied = if output.succeeded() {
            self.apply_target(finished.spec.target, &output.stdout)
        } else {
            Ok(())
        };
        let result = applied.map(|()| Reply {
            status: output.exit_code(),
            stdout: output.stdout,
            stderr: output.stderr,
        });
        if let Some(reply) = finished.reply {
            if reply.send(result).is_err() {
                debug!(target: ENGINE_TARGET, id, "session closed before action finished");
            }
        } else if let Err(error) = result {
            self.warn_clients(error.to_string());
        }
        self.notify(Notification::ActionFinished { id, outcome });
    }

    fn apply_target(&mut self, target: ActionTarget, stdout: &[u8]) -> Result<(), DispatchError> {
        match target {
            ActionTarget::Create {
                tab,
                separator,
                mime,
            } => {
                let tab = tab.unwrap_or_else(|| self.history.default_tab().to_owned());
                let items = split_output(stdout, separator.as_deref(), &mime);
                self.commit_items(&tab, items)?;
            }
            ActionTarget::Replace {
                tab,
                row,
                original,
                mime,
            } => {
                let Some(row) = self.locate(&tab, row, &original) else {
                    self.warn_clients(format!("item changed in tab '{tab}' while the action ran"));
                    return Ok(());
                };
                let mut item = self.history.get(&tab, row)?.clone();
                item.insert(mime, stdout.to_vec());
                self.history.replace(&tab, row, item)?;
                self.items_changed(&tab);
            }
        }
        Ok(())
    }

    /// Finds an item again after it may have moved.
    fn locate(&self, tab: &str, row: usize, original: &MimeData) -> Option<usize> {
        if self
            .history
            .get(tab, row)
            .is_ok_and(|item| item.same_content(original))
        {
            return Some(row);
        }
        self.history
            .items(tab)
            .ok()?
            .position(|item| item.same_content(original))
    }

    fn edit_finished(&mut self, target: EditTarget, result: Result<String, String>) {
        self.editors.reap();
        let text = match result {
            Ok(text) => text,
            Err(reason) => {
                self.warn_clients(format!("editor {reason}"));
                return;
            }
        };
        if let Err(error) = self.apply_edit(target, text) {
            self.warn_clients(error.to_string());
        }
    }

    pub(super) fn apply_edit(&mut self, target: EditTarget, text: String) -> Result<(), DispatchError> {
        match target {
            EditTarget::New { tab } => {
                self.commit_items(&tab, vec![MimeData::from_text(text)])?;
            }
            EditTarget::Row { tab, row, original } => {
                let Some(row) = self.locate(&tab, row, &original) else {
                    return Err(HistoryError::RowOutOfRange {
                        row: i64::try_from(row).unwrap_or(i64::MAX),
                        len: self.history.len(&tab)?,
                    }
                    .into());
                };
                let mut item = self.history.get(&tab, row)?.clone();
                if item.text().as_deref() == Some(text.as_str()) {
                    return Ok(());
                }
                item.set_text(text);
                self.history.replace(&tab, row, item)?;
                self.items_changed(&tab);
            }
            EditTarget::Clipboard => {
                let item = MimeData::from_text(text);
                let default_tab = self.history.default_tab().to_owned();
                self.commit_items(&default_tab, vec![item.clone()])?;
                self.set_clipboard(Source::Clipboard, item)?;
            }
        }
        Ok(())
    }

    fn schedule_save(&mut self) {
        if self.history.is_dirty() && self.save_deadline.is_none() {
            self.save_deadline = Some(Instant::now() + SAVE_DELAY);
        }
    }

    pub(super) fn save_history(&mut self) {
        self.save_deadline = None;
        if let Err(error) = self.history.save() {
            self.warn_clients(format!("failed to save history: {error}"));
        }
    }

    fn finish(&mut self) {
        self.actions.stop_all();
        self.editors.stop_all();
        if self.history.is_dirty() {
            self.save_history();
        }
        info!(target: ENGINE_TARGET, "engine stopped");
    }
}
