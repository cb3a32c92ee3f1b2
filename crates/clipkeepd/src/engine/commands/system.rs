//! `config`, `exit` and the `tests` self check.

use std::collections::BTreeSet;

use clipkeep_types::session::Notification;
use tracing::{info, warn};

use super::usage;
use crate::dispatch::DispatchError;
use crate::engine::arguments::Arguments;
use crate::engine::options::parse_name;
use crate::engine::owner::Owner;
use crate::engine::{ENGINE_TARGET, OptionName, Reply};
use crate::watcher::WatcherState;

impl Owner {
    /// `config` lists options, `config NAME` prints one and
    /// `config NAME VALUE` changes it.
    pub(super) fn config(&mut self, arguments: &Arguments) -> Result<Reply, DispatchError> {
        let Some(text) = arguments.text(0) else {
            return Ok(Reply::output(self.options.listing()));
        };
        let name = parse_name(&text).map_err(|error| DispatchError::invalid_option(&text, error.message))?;
        match arguments.len() {
            1 => Ok(Reply::output(format!("{}\n", self.options.get(name)))),
            2 => {
                let value = arguments.text(1).unwrap_or_default();
                self.set_option(name, &value)?;
                Ok(Reply::default())
            }
            _ => Err(DispatchError::invalid_arguments(usage("config"))),
        }
    }

    fn set_option(&mut self, name: OptionName, value: &str) -> Result<(), DispatchError> {
        let mut options = self.options.clone();
        options
            .set(name, value)
            .map_err(|error| DispatchError::invalid_option(name.as_ref(), error.message))?;
        if name == OptionName::Tabs {
            for tab in &options.tabs {
                self.history.ensure_tab(tab)?;
            }
            let listed: BTreeSet<&String> = options.tabs.iter().collect();
            let unlisted: Vec<String> = self
                .history
                .tab_names()
                .into_iter()
                .filter(|tab| !listed.contains(tab))
                .collect();
            options.tabs.extend(unlisted);
        }
        options.save(&self.options_path)?;
        self.options = options;
        info!(target: ENGINE_TARGET, option = %name, "option changed");

        match name {
            OptionName::Maxitems => {
                for tab in self.history.set_capacity(self.options.maxitems) {
                    self.items_changed(&tab);
                }
            }
            OptionName::Ignore => {
                self.ignore = self
                    .options
                    .ignore_pattern()
                    .map_err(|error| DispatchError::invalid_option(name.as_ref(), error.to_string()))?;
            }
            OptionName::Tabs => {
                let tabs = self.options.tabs.clone();
                self.notify(Notification::TabsChanged { tabs });
            }
            _ => {}
        }
        if name.affects_watcher()
            && let Err(error) = self.monitor.reconfigure(self.options.watcher_settings())
        {
            warn!(target: ENGINE_TARGET, %error, "clipboard monitor not reconfigured");
        }
        Ok(())
    }

    /// Saves history and asks the server to stop.
    pub(super) fn exit(&mut self) -> Result<Reply, DispatchError> {
        self.history.save()?;
        info!(target: ENGINE_TARGET, "exit requested");
        (self.on_exit)();
        Ok(Reply::default())
    }

    /// Checks rules, history invariants and the watcher, one line per
    /// check. Exits with status 1 when any check fails.
    pub(super) fn self_test(&self) -> Reply {
        let mut checks: Vec<(String, Result<(), String>)> = Vec::new();

        for problem in self.rules.problems() {
            checks.push((
                format!("rule {} '{}'", problem.index, problem.name),
                Err(problem.defect.to_string()),
            ));
        }
        if self.rules.problems().is_empty() {
            checks.push(("rules compile".to_owned(), Ok(())));
        }

        let names = self.history.tab_names();
        let unique: BTreeSet<&String> = names.iter().collect();
        let tab_check = if names.iter().any(String::is_empty) {
            Err("empty tab name".to_owned())
        } else if unique.len() != names.len() {
            Err("duplicate tab names".to_owned())
        } else {
            Ok(())
        };
        checks.push(("tab names".to_owned(), tab_check));
        for tab in &names {
            let len = self.history.len(tab).unwrap_or_default();
            let result = if len > self.history.capacity() {
                Err(format!("{len} items exceed capacity {}", self.history.capacity()))
            } else {
                Ok(())
            };
            checks.push((format!("tab '{tab}' capacity"), result));
        }

        let state = self.monitor.state();
        let watcher = match state {
            WatcherState::GaveUp | WatcherState::Crashed { .. } => Err(format!("watcher {state}")),
            _ => Ok(()),
        };
        checks.push(("clipboard monitor".to_owned(), watcher));

        let mut reply = Reply::default();
        for (name, result) in checks {
            let line = match result {
                Ok(()) => format!("PASS {name}\n"),
                Err(reason) => {
                    reply.status = 1;
                    format!("FAIL {name}: {reason}\n")
                }
            };
            reply.stdout.extend(line.into_bytes());
        }
        reply
    }
}
