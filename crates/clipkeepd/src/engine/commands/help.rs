//! `help` and `version`.

use crate::dispatch::DispatchError;
use crate::engine::Reply;
use crate::engine::arguments::Arguments;

/// Verb, argument synopsis and description of every command.
pub(super) const HELP: &[(&str, &str, &str)] = &[
    ("show", "", "show the history window"),
    ("hide", "", "hide the history window"),
    ("toggle", "", "show or hide the history window"),
    ("menu", "", "open the tray menu"),
    ("action", "[ROWS...] [PROGRAM [SEPARATOR]]", "run PROGRAM on item text; without arguments open the action dialog"),
    ("run", "NAME [ROWS...]", "run a rule on item text"),
    ("confirm", "ID [COMMAND]", "start a pending action, optionally with an edited command"),
    ("cancel", "ID", "drop a pending action or stop a running one"),
    ("actions", "", "list pending and running actions"),
    ("rules", "", "list rules"),
    ("exit", "", "save history and stop the server"),
    ("enable", "", "store new clipboard content"),
    ("disable", "", "stop storing new clipboard content"),
    ("monitoring", "", "print whether new clipboard content is stored"),
    ("clipboard", "[MIME|?]", "print clipboard content"),
    ("selection", "[MIME|?]", "print selection content"),
    ("copy", "TEXT | MIME DATA [MIME DATA...]", "set clipboard content"),
    ("length", "", "print number of items in the tab"),
    ("select", "ROW", "move item to the top and copy it"),
    ("next", "", "copy the next item"),
    ("previous", "", "copy the previous item"),
    ("add", "TEXT...", "add texts to the top"),
    ("insert", "ROW TEXT", "insert text at row"),
    ("remove", "[ROWS...]", "remove items (default row 0)"),
    ("edit", "[ROWS...] | ROW TEXT", "edit items in the editor or replace text; -1 is the clipboard"),
    ("separator", "SEPARATOR COMMAND...", "set the separator for the command"),
    ("read", "[MIME|?] [ROWS...]", "print item data; ? lists formats"),
    ("write", "[ROW] MIME DATA [MIME DATA...]", "insert an item with raw data"),
    ("popup", "TITLE [MESSAGE [MS]]", "show a tray notification"),
    ("tab", "[NAME [COMMAND...]]", "list tabs or run a command in a tab"),
    ("removetab", "NAME", "remove a tab"),
    ("renametab", "OLD NEW", "rename a tab"),
    ("exporttab", "FILE", "save the tab's items to a file"),
    ("importtab", "FILE", "append items from a file to the tab"),
    ("config", "[NAME [VALUE]]", "list, print or set options"),
    ("eval", "SCRIPT", "run one command per script line"),
    ("help", "[COMMAND]", "print help"),
    ("version", "", "print version"),
    ("tests", "", "run self checks"),
];

/// `usage: VERB ARGS` for error messages.
pub(super) fn usage(verb: &str) -> String {
    HELP.iter()
        .find(|(name, _, _)| *name == verb)
        .map_or_else(
            || format!("usage: {verb}"),
            |(name, synopsis, _)| format!("usage: {name} {synopsis}").trim_end().to_owned(),
        )
}

fn line(name: &str, synopsis: &str, description: &str) -> String {
    let head = format!("{name} {synopsis}");
    format!("  {:<40} {description}\n", head.trim_end())
}

pub(super) fn help(arguments: &Arguments) -> Result<Reply, DispatchError> {
    let Some(verb) = arguments.text(0) else {
        let mut text = String::from("Usage: clipkeep COMMAND [ARGUMENTS...]\n\nCommands:\n");
        for (name, synopsis, description) in HELP {
            text.push_str(&line(name, synopsis, description));
        }
        text.push_str("  listen                                   receive notifications (client)\n");
        text.push_str("  daemon start|stop|status                 manage the server (client)\n");
        return Ok(Reply::output(text));
    };
    HELP.iter()
        .find(|(name, _, _)| *name == verb)
        .map(|(name, synopsis, description)| Reply::output(line(name, synopsis, description)))
        .ok_or_else(|| DispatchError::unknown_command(verb))
}

pub(super) fn version() -> Reply {
    Reply::output(format!("clipkeep {}\n", env!("CARGO_PKG_VERSION")))
}
