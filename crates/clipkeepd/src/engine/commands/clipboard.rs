//! Clipboard cache, clipboard writes and monitoring control.

use clipkeep_types::session::Notification;
use clipkeep_types::{MimeData, Source, TEXT_PLAIN};
use tracing::info;

use super::usage;
use crate::dispatch::DispatchError;
use crate::engine::arguments::Arguments;
use crate::engine::owner::Owner;
use crate::engine::{ENGINE_TARGET, Reply};

/// One format name per line.
pub(super) fn format_listing(data: &MimeData) -> String {
    data.formats().map(|mime| format!("{mime}\n")).collect()
}

/// Data of `mime` in `data`, or its format listing for `?`.
pub(super) fn format_data(data: &MimeData, mime: &str) -> Vec<u8> {
    if mime == "?" {
        return format_listing(data).into_bytes();
    }
    data.get(mime).map(<[u8]>::to_vec).unwrap_or_default()
}

impl Owner {
    pub(super) fn read_cache(&self, source: Source, arguments: &Arguments) -> Result<Reply, DispatchError> {
        if arguments.len() > 1 {
            return Err(DispatchError::invalid_arguments(usage(source.as_str())));
        }
        let mime = arguments.text(0).unwrap_or_else(|| TEXT_PLAIN.to_owned());
        Ok(Reply::output(format_data(self.cached(source), &mime)))
    }

    pub(super) fn copy(&self, arguments: &Arguments) -> Result<Reply, DispatchError> {
        let data = if arguments.len() == 1 {
            MimeData::from_text(arguments.require(0, &usage("copy"))?)
        } else {
            arguments
                .pairs(0)
                .ok_or_else(|| DispatchError::invalid_arguments(usage("copy")))?
                .into_iter()
                .collect()
        };
        self.set_clipboard(Source::Clipboard, data)?;
        Ok(Reply::default())
    }

    pub(super) fn set_monitoring(&mut self, enabled: bool) -> Reply {
        if self.monitoring != enabled {
            self.monitoring = enabled;
            info!(target: ENGINE_TARGET, enabled, "clipboard storing toggled");
            self.notify(Notification::MonitoringChanged { enabled });
        }
        Reply::default()
    }
}
