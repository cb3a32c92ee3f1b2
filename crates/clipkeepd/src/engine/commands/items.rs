//! Item verbs working on the context's tab.

use std::collections::BTreeSet;
use std::sync::Arc;

use clipkeep_types::{MimeData, Source, TEXT_PLAIN};
use tracing::warn;

use super::Context;
use super::clipboard::format_data;
use super::usage;
use crate::dispatch::DispatchError;
use crate::engine::arguments::{Arguments, parse_index, resolve_position, resolve_row};
use crate::engine::editor::EditTarget;
use crate::engine::owner::Owner;
use crate::engine::{ENGINE_TARGET, Reply};

/// Row meaning the clipboard in `edit`.
const CLIPBOARD_ROW: i64 = -1;

impl Owner {
    fn resolve(&self, tab: &str, row: i64) -> Result<usize, DispatchError> {
        Ok(resolve_row(row, self.history.len(tab)?)?)
    }

    pub(super) fn length(&self, context: &Context) -> Result<Reply, DispatchError> {
        let len = self.history.len(&context.tab)?;
        Ok(Reply::output(format!("{len}\n")))
    }

    pub(super) fn select(&mut self, context: &Context, arguments: &Arguments) -> Result<Reply, DispatchError> {
        if arguments.len() != 1 {
            return Err(DispatchError::invalid_arguments(usage("select")));
        }
        let rows = arguments.rows(0, 1)?;
        let row = self.resolve(&context.tab, rows.first().copied().unwrap_or_default())?;
        self.history.move_item(&context.tab, row, 0)?;
        self.current_row = 0;
        self.items_changed(&context.tab);
        let item = self.history.get(&context.tab, 0)?.clone();
        if let Err(error) = self.set_clipboard(Source::Clipboard, item) {
            warn!(target: ENGINE_TARGET, %error, "selected item not copied");
        }
        Ok(Reply::default())
    }

    pub(super) fn step(&mut self, context: &Context, forward: bool) -> Result<Reply, DispatchError> {
        let len = self.history.len(&context.tab)?;
        if len == 0 {
            return Ok(Reply::default());
        }
        let last = len - 1;
        self.current_row = if forward {
            (self.current_row + 1).min(last)
        } else {
            self.current_row.min(last).saturating_sub(1)
        };
        let item = self.history.get(&context.tab, self.current_row)?.clone();
        self.set_clipboard(Source::Clipboard, item)?;
        Ok(Reply::default())
    }

    pub(super) fn add(&mut self, context: &Context, arguments: &Arguments) -> Result<Reply, DispatchError> {
        if arguments.is_empty() {
            return Err(DispatchError::invalid_arguments(usage("add")));
        }
        for index in 0..arguments.len() {
            let text = arguments.text(index).unwrap_or_default();
            self.history.insert(&context.tab, 0, MimeData::from_text(text))?;
        }
        self.items_changed(&context.tab);
        Ok(Reply::default())
    }

    pub(super) fn insert(&mut self, context: &Context, arguments: &Arguments) -> Result<Reply, DispatchError> {
        if arguments.len() != 2 || !arguments.is_row(0) {
            return Err(DispatchError::invalid_arguments(usage("insert")));
        }
        let rows = arguments.rows(0, 1)?;
        let len = self.history.len(&context.tab)?;
        let row = resolve_position(rows.first().copied().unwrap_or_default(), len)?;
        let text = arguments.text(1).unwrap_or_default();
        self.history.insert(&context.tab, row, MimeData::from_text(text))?;
        self.items_changed(&context.tab);
        Ok(Reply::default())
    }

    pub(super) fn remove(&mut self, context: &Context, arguments: &Arguments) -> Result<Reply, DispatchError> {
        let rows = if arguments.is_empty() {
            vec![0]
        } else {
            arguments.rows(0, arguments.len())?
        };
        let len = self.history.len(&context.tab)?;
        let rows: BTreeSet<usize> = rows
            .into_iter()
            .filter_map(|row| resolve_row(row, len).ok())
            .collect();
        if self.history.remove(&context.tab, &rows)? > 0 {
            self.current_row = 0;
            self.items_changed(&context.tab);
        }
        Ok(Reply::default())
    }

    /// `edit ROW TEXT` replaces directly; any other form opens the editor,
    /// once per row or once for a new item.
    pub(super) fn edit(&mut self, context: &Context, arguments: &Arguments) -> Result<Reply, DispatchError> {
        let direct = arguments.len() == 2 && arguments.is_row(0) && !arguments.is_row(1);
        if direct {
            let row = arguments.rows(0, 1)?.first().copied().unwrap_or_default();
            let text = arguments.text(1).unwrap_or_default();
            let target = self.edit_target(&context.tab, row)?;
            self.apply_edit(target, text)?;
            return Ok(Reply::default());
        }
        if arguments.is_empty() {
            let target = EditTarget::New {
                tab: context.tab.clone(),
            };
            self.open_editor(String::new(), target)?;
            return Ok(Reply::default());
        }
        let rows = arguments.rows(0, arguments.len())?;
        let targets = rows
            .into_iter()
            .map(|row| self.edit_target(&context.tab, row))
            .collect::<Result<Vec<_>, _>>()?;
        for target in targets {
            let text = match &target {
                EditTarget::Row { original, .. } => original.text_or_empty(),
                EditTarget::Clipboard => self.clipboard.text_or_empty(),
                EditTarget::New { .. } => String::new(),
            };
            self.open_editor(text, target)?;
        }
        Ok(Reply::default())
    }

    fn edit_target(&self, tab: &str, row: i64) -> Result<EditTarget, DispatchError> {
        if row == CLIPBOARD_ROW {
            return Ok(EditTarget::Clipboard);
        }
        let index = self.resolve(tab, row)?;
        Ok(EditTarget::Row {
            tab: tab.to_owned(),
            row: index,
            original: self.history.get(tab, index)?.clone(),
        })
    }

    fn open_editor(&mut self, text: String, target: EditTarget) -> Result<(), DispatchError> {
        self.editors.open(
            &self.options.editor,
            &text,
            target,
            Arc::clone(&self.executor),
            self.events.clone(),
        )?;
        Ok(())
    }

    /// `read [MIME|?] [ROWS...]`; without rows the clipboard is read.
    pub(super) fn read(&self, context: &Context, arguments: &Arguments) -> Result<Reply, DispatchError> {
        let (mime, first_row) = if arguments.is_empty() || arguments.is_row(0) {
            (TEXT_PLAIN.to_owned(), 0)
        } else {
            (arguments.require(0, &usage("read"))?, 1)
        };
        if first_row >= arguments.len() {
            return Ok(Reply::output(format_data(&self.clipboard, &mime)));
        }
        let rows = arguments.rows(first_row, arguments.len())?;
        let mut output = Vec::new();
        for (position, row) in rows.into_iter().enumerate() {
            if position > 0 {
                output.extend_from_slice(context.separator.as_bytes());
            }
            let index = self.resolve(&context.tab, row)?;
            output.extend(format_data(self.history.get(&context.tab, index)?, &mime));
        }
        Ok(Reply::output(output))
    }

    /// `write [ROW] MIME DATA [MIME DATA...]`.
    pub(super) fn write(&mut self, context: &Context, arguments: &Arguments) -> Result<Reply, DispatchError> {
        let (row, first_pair) = if !arguments.len().is_multiple_of(2) {
            let text = arguments.require(0, &usage("write"))?;
            let row = parse_index(&text)
                .ok_or_else(|| DispatchError::invalid_arguments(usage("write")))?;
            (row, 1)
        } else {
            (0, 0)
        };
        let item: MimeData = arguments
            .pairs(first_pair)
            .ok_or_else(|| DispatchError::invalid_arguments(usage("write")))?
            .into_iter()
            .collect();
        let len = self.history.len(&context.tab)?;
        let row = resolve_position(row, len)?;
        self.history.insert(&context.tab, row, item)?;
        self.items_changed(&context.tab);
        Ok(Reply::default())
    }
}
