//! Interactive rule runs and ad-hoc actions.

use std::sync::Arc;

use clipkeep_types::session::{Notification, UiRequest};
use clipkeep_types::{MimeData, TEXT_PLAIN};

use super::Context;
use super::usage;
use crate::dispatch::DispatchError;
use crate::engine::Reply;
use crate::engine::actions::Cancelled;
use crate::engine::arguments::{Arguments, parse_index, resolve_row};
use crate::engine::owner::Owner;
use crate::rules::command_line::parse_chain;
use crate::rules::{
    ActionSpec, ActionTarget, RuleAction, RuleMatch, output_mime, script_for, substitute_stages,
    uses_text_placeholder,
};

impl Owner {
    /// Items at `rows` of the context's tab, row 0 when none are given.
    fn selected(&self, context: &Context, rows: &[i64]) -> Result<Vec<(usize, MimeData)>, DispatchError> {
        let rows = if rows.is_empty() { &[0][..] } else { rows };
        let len = self.history.len(&context.tab)?;
        rows.iter()
            .map(|row| {
                let index = resolve_row(*row, len)?;
                Ok((index, self.history.get(&context.tab, index)?.clone()))
            })
            .collect()
    }

    /// Starts `spec` and hands the session's reply to the action.
    fn start_action(&mut self, context: &mut Context, spec: ActionSpec) -> Result<Reply, DispatchError> {
        let hide_window = spec.hide_window;
        self.actions.start(
            spec,
            &mut context.reply,
            Arc::clone(&self.executor),
            self.events.clone(),
        )?;
        if hide_window {
            self.notify(Notification::Ui {
                request: UiRequest::Hide,
                text: None,
            });
        }
        Ok(Reply::default())
    }

    /// `action` opens the action dialog; `action [ROWS...] PROGRAM
    /// [SEPARATOR]` runs a chain on the joined item texts.
    pub(super) fn action(&mut self, context: &mut Context, arguments: &Arguments) -> Result<Reply, DispatchError> {
        if arguments.is_empty() {
            let text = self.clipboard.text();
            self.notify(Notification::Ui {
                request: UiRequest::ActionDialog,
                text,
            });
            return Ok(Reply::default());
        }
        let row_count = arguments.leading_rows();
        let rest = arguments.len() - row_count;
        if rest == 0 || rest > 2 {
            return Err(DispatchError::invalid_arguments(usage("action")));
        }
        let rows = arguments.rows(0, row_count)?;
        let program = arguments.require(row_count, &usage("action"))?;
        let separator = arguments.text(row_count + 1);
        let text = self
            .selected(context, &rows)?
            .into_iter()
            .map(|(_, item)| item.text_or_empty())
            .collect::<Vec<_>>()
            .join("\n");
        let stages = parse_chain(&program).map_err(|error| DispatchError::invalid_arguments(error.to_string()))?;
        let input = (!uses_text_placeholder(&stages)).then(|| text.clone().into_bytes());
        let spec = ActionSpec {
            name: String::new(),
            stages: substitute_stages(&stages, &RuleMatch::text_only(text)),
            input,
            timeout: None,
            target: ActionTarget::Create {
                tab: Some(context.tab.clone()),
                separator,
                mime: TEXT_PLAIN.to_owned(),
            },
            hide_window: false,
        };
        self.start_action(context, spec)
    }

    /// `run NAME [ROWS...]` applies a rule, automatic or not, to items.
    pub(super) fn run_rule(&mut self, context: &mut Context, arguments: &Arguments) -> Result<Reply, DispatchError> {
        let name = arguments.require(0, &usage("run"))?;
        let rule = self
            .rules
            .find(&name)
            .cloned()
            .ok_or_else(|| DispatchError::RuleNotFound { name: name.clone() })?;
        let rows = arguments.rows(1, arguments.len())?;
        let selected = self.selected(context, &rows)?;
        let (row, item) = match selected.as_slice() {
            [(row, item)] => (Some(*row), item.clone()),
            items => (
                None,
                MimeData::from_text(
                    items
                        .iter()
                        .map(|(_, item)| item.text_or_empty())
                        .collect::<Vec<_>>()
                        .join("\n"),
                ),
            ),
        };
        let found = rule
            .matches(&item, None)
            .unwrap_or_else(|| RuleMatch::text_only(item.text_or_empty()));
        let stages = match &rule.action {
            RuleAction::None => {
                return Err(DispatchError::invalid_arguments(format!(
                    "rule '{name}' has no command"
                )));
            }
            RuleAction::Script(script) => return self.eval_script(context, &script_for(script, &found)),
            RuleAction::Chain(stages) => stages,
        };
        let mut spec = ActionSpec::from_rule(&rule, stages, &found, rule.input_bytes(&item));
        spec.target = match (rule.transform, row) {
            (true, Some(row)) => ActionTarget::Replace {
                tab: context.tab.clone(),
                row,
                original: item,
                mime: output_mime(&rule),
            },
            _ => ActionTarget::Create {
                tab: Some(rule.tab.clone().unwrap_or_else(|| context.tab.clone())),
                separator: Some(rule.separator.clone()),
                mime: output_mime(&rule),
            },
        };
        if rule.wait {
            let id = self.queue_action(spec);
            return Ok(Reply::output(format!("{id}\n")));
        }
        self.start_action(context, spec)
    }

    /// `confirm ID [COMMAND]` starts a pending action, optionally with an
    /// edited command line.
    pub(super) fn confirm(&mut self, context: &mut Context, arguments: &Arguments) -> Result<Reply, DispatchError> {
        if arguments.is_empty() || arguments.len() > 2 {
            return Err(DispatchError::invalid_arguments(usage("confirm")));
        }
        let id = action_id(arguments)?;
        let edited = match arguments.text(1) {
            Some(command) => Some(
                parse_chain(&command).map_err(|error| DispatchError::invalid_arguments(error.to_string()))?,
            ),
            None => None,
        };
        let mut spec = self
            .actions
            .take_pending(id)
            .ok_or(DispatchError::ActionNotFound { id })?;
        if let Some(stages) = edited {
            spec.stages = stages;
        }
        self.start_action(context, spec)
    }

    pub(super) fn cancel(&mut self, arguments: &Arguments) -> Result<Reply, DispatchError> {
        if arguments.len() != 1 {
            return Err(DispatchError::invalid_arguments(usage("cancel")));
        }
        let id = action_id(arguments)?;
        match self.actions.cancel(id) {
            None => Err(DispatchError::ActionNotFound { id }),
            Some(Cancelled::Dropped) => {
                self.notify(Notification::ActionFinished {
                    id,
                    outcome: "cancelled".to_owned(),
                });
                Ok(Reply::default())
            }
            Some(Cancelled::Stopping) => Ok(Reply::default()),
        }
    }

    /// One line per rule: position, name, state and flags.
    pub(super) fn rules_listing(&self) -> Reply {
        let listing: String = self
            .rules
            .rules()
            .iter()
            .enumerate()
            .map(|(index, rule)| {
                let state = if rule.enabled { "enabled" } else { "disabled" };
                format!("{index}\t{}\t{state}\t{}\n", rule.name, rule.flags())
            })
            .collect();
        Reply::output(listing)
    }
}

fn action_id(arguments: &Arguments) -> Result<u64, DispatchError> {
    let text = arguments.text(0).unwrap_or_default();
    parse_index(&text)
        .and_then(|id| u64::try_from(id).ok())
        .ok_or_else(|| DispatchError::invalid_arguments(format!("'{text}' is not an action id")))
}
