//! Command verbs executed on the engine thread.
//!
//! Every verb is a method on the owner taking a [`Context`] and the decoded
//! arguments. Verbs that start an action take the context's reply sender
//! and answer once the action ends; all others return their reply directly.

mod automation;
mod clipboard;
mod help;
mod items;
mod system;
mod tabs;
mod ui;

use clipkeep_types::Source;
use clipkeep_types::session::UiRequest;

use super::arguments::Arguments;
use super::owner::Owner;
use super::{Reply, ReplySender};
use crate::dispatch::DispatchError;
use crate::rules::command_line::split_script;

use self::help::usage;

/// Nested `eval`, `tab` and `separator` commands stop at this depth.
const MAX_DEPTH: usize = 16;

/// Per-invocation state threaded through nested commands.
pub(crate) struct Context {
    /// Tab the command works on.
    pub(super) tab: String,
    /// Separator used by `read` and `action` output.
    pub(super) separator: String,
    /// Where the final reply goes; `None` inside scripts.
    pub(crate) reply: Option<ReplySender>,
    depth: usize,
}

impl Context {
    pub(super) fn new(tab: String, reply: Option<ReplySender>) -> Self {
        Self {
            tab,
            separator: "\n".to_owned(),
            reply,
            depth: 0,
        }
    }

    fn nested(&mut self) -> Result<Self, DispatchError> {
        if self.depth >= MAX_DEPTH {
            return Err(DispatchError::invalid_arguments("commands nested too deeply"));
        }
        Ok(Self {
            tab: self.tab.clone(),
            separator: self.separator.clone(),
            reply: self.reply.take(),
            depth: self.depth + 1,
        })
    }
}

impl Owner {
    pub(super) fn execute(
        &mut self,
        context: &mut Context,
        command: &str,
        arguments: Arguments,
    ) -> Result<Reply, DispatchError> {
        match command {
            "show" => Ok(self.ui(UiRequest::Show)),
            "hide" => Ok(self.ui(UiRequest::Hide)),
            "toggle" => Ok(self.ui(UiRequest::Toggle)),
            "menu" => Ok(self.ui(UiRequest::Menu)),
            "popup" => self.popup(&arguments),
            "action" => self.action(context, &arguments),
            "run" => self.run_rule(context, &arguments),
            "confirm" => self.confirm(context, &arguments),
            "cancel" => self.cancel(&arguments),
            "actions" => Ok(Reply::output(self.actions.listing())),
            "rules" => Ok(self.rules_listing()),
            "exit" => self.exit(),
            "enable" => Ok(self.set_monitoring(true)),
            "disable" => Ok(self.set_monitoring(false)),
            "monitoring" => Ok(Reply::output(format!("{}\n", self.monitoring))),
            "clipboard" => self.read_cache(Source::Clipboard, &arguments),
            "selection" => self.read_cache(Source::Selection, &arguments),
            "copy" => self.copy(&arguments),
            "length" | "size" | "count" => self.length(context),
            "select" => self.select(context, &arguments),
            "next" => self.step(context, true),
            "previous" => self.step(context, false),
            "add" => self.add(context, &arguments),
            "insert" => self.insert(context, &arguments),
            "remove" => self.remove(context, &arguments),
            "edit" => self.edit(context, &arguments),
            "separator" => self.with_separator(context, &arguments),
            "read" => self.read(context, &arguments),
            "write" => self.write(context, &arguments),
            "tab" => self.tab(context, &arguments),
            "removetab" => self.remove_tab(&arguments),
            "renametab" => self.rename_tab(&arguments),
            "exporttab" => self.export_tab(context, &arguments),
            "importtab" => self.import_tab(context, &arguments),
            "config" => self.config(&arguments),
            "eval" => self.eval(context, &arguments),
            "help" => help::help(&arguments),
            "version" => Ok(help::version()),
            "tests" => Ok(self.self_test()),
            other => Err(DispatchError::unknown_command(other)),
        }
    }

    /// Runs `arguments` as a command inside a nested context prepared by
    /// `prepare`.
    fn execute_nested(
        &mut self,
        context: &mut Context,
        arguments: &Arguments,
        prepare: impl FnOnce(&mut Context),
    ) -> Result<Reply, DispatchError> {
        let mut nested = context.nested()?;
        prepare(&mut nested);
        let command = arguments.require(0, "missing command")?;
        let result = self.execute(&mut nested, &command, arguments.tail(1));
        context.reply = nested.reply.take();
        result
    }

    /// Executes one command per script line, concatenating the output.
    /// The first failing command stops the script.
    pub(super) fn eval_script(&mut self, context: &mut Context, script: &str) -> Result<Reply, DispatchError> {
        let commands =
            split_script(script).map_err(|error| DispatchError::invalid_arguments(error.to_string()))?;
        let mut nested = context.nested()?;
        let reply = nested.reply.take();
        let mut output = Reply::default();
        let result = commands.into_iter().try_for_each(|words| {
            let mut words = words.into_iter();
            let Some(command) = words.next() else {
                return Ok(());
            };
            let part = self.execute(&mut nested, &command, Arguments::from_words(words))?;
            output.append(part);
            Ok(())
        });
        context.reply = reply;
        result.map(|()| output)
    }

    fn eval(&mut self, context: &mut Context, arguments: &Arguments) -> Result<Reply, DispatchError> {
        if arguments.len() != 1 {
            return Err(DispatchError::invalid_arguments(usage("eval")));
        }
        let script = arguments.require(0, &usage("eval"))?;
        self.eval_script(context, &script)
    }

    fn with_separator(&mut self, context: &mut Context, arguments: &Arguments) -> Result<Reply, DispatchError> {
        if arguments.len() < 2 {
            return Err(DispatchError::invalid_arguments(usage("separator")));
        }
        let separator = arguments.require(0, &usage("separator"))?;
        self.execute_nested(context, &arguments.tail(1), |nested| {
            nested.separator = separator;
        })
    }
}
