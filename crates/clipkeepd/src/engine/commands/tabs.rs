//! Tab management, export and import.

use std::io;
use std::path::PathBuf;

use super::Context;
use super::usage;
use crate::dispatch::DispatchError;
use crate::engine::Reply;
use crate::engine::arguments::Arguments;
use crate::engine::owner::Owner;
use crate::history::{read_items, write_items};

impl Owner {
    /// `tab` lists tabs; `tab NAME` creates it on first use;
    /// `tab NAME COMMAND...` runs the command in that tab.
    pub(super) fn tab(&mut self, context: &mut Context, arguments: &Arguments) -> Result<Reply, DispatchError> {
        let Some(name) = arguments.text(0) else {
            let names: String = self
                .history
                .tab_names()
                .into_iter()
                .map(|name| format!("{name}\n"))
                .collect();
            return Ok(Reply::output(names));
        };
        self.ensure_tab(&name)?;
        if arguments.len() == 1 {
            return Ok(Reply::default());
        }
        self.execute_nested(context, &arguments.tail(1), |nested| {
            nested.tab = name;
        })
    }

    pub(super) fn remove_tab(&mut self, arguments: &Arguments) -> Result<Reply, DispatchError> {
        if arguments.len() != 1 {
            return Err(DispatchError::invalid_arguments(usage("removetab")));
        }
        let name = arguments.require(0, &usage("removetab"))?;
        self.history.remove_tab(&name)?;
        self.tabs_changed();
        Ok(Reply::default())
    }

    pub(super) fn rename_tab(&mut self, arguments: &Arguments) -> Result<Reply, DispatchError> {
        if arguments.len() != 2 {
            return Err(DispatchError::invalid_arguments(usage("renametab")));
        }
        let old = arguments.require(0, &usage("renametab"))?;
        let new = arguments.require(1, &usage("renametab"))?;
        self.history.rename_tab(&old, &new)?;
        self.tabs_changed();
        Ok(Reply::default())
    }

    pub(super) fn export_tab(&self, context: &Context, arguments: &Arguments) -> Result<Reply, DispatchError> {
        let path = file_argument(arguments, "exporttab")?;
        write_items(&path, self.history.items(&context.tab)?)?;
        Ok(Reply::default())
    }

    /// Appends the file's items after the oldest item, so exporting a tab
    /// and importing it into an empty tab reproduces it.
    pub(super) fn import_tab(&mut self, context: &Context, arguments: &Arguments) -> Result<Reply, DispatchError> {
        let path = file_argument(arguments, "importtab")?;
        let Some(items) = read_items(&path)? else {
            return Err(DispatchError::FileOpen {
                path,
                source: io::Error::from(io::ErrorKind::NotFound),
            });
        };
        if self.history.append(&context.tab, items)? > 0 {
            self.items_changed(&context.tab);
        }
        Ok(Reply::default())
    }
}

fn file_argument(arguments: &Arguments, verb: &str) -> Result<PathBuf, DispatchError> {
    if arguments.len() != 1 {
        return Err(DispatchError::invalid_arguments(usage(verb)));
    }
    Ok(PathBuf::from(arguments.require(0, &usage(verb))?))
}
