//! Requests forwarded to user interfaces listening on interactive sessions.

use clipkeep_types::session::{Notification, UiRequest};

use super::usage;
use crate::dispatch::DispatchError;
use crate::engine::Reply;
use crate::engine::arguments::Arguments;
use crate::engine::owner::Owner;

const POPUP_TIMEOUT_MS: u64 = 8000;

impl Owner {
    pub(super) fn ui(&mut self, request: UiRequest) -> Reply {
        self.notify(Notification::Ui {
            request,
            text: None,
        });
        Reply::default()
    }

    pub(super) fn popup(&mut self, arguments: &Arguments) -> Result<Reply, DispatchError> {
        if arguments.is_empty() || arguments.len() > 3 {
            return Err(DispatchError::invalid_arguments(usage("popup")));
        }
        let title = arguments.require(0, &usage("popup"))?;
        let message = arguments.text(1).unwrap_or_default();
        let timeout_ms = match arguments.text(2) {
            None => POPUP_TIMEOUT_MS,
            Some(value) => value.trim().parse().map_err(|_| {
                DispatchError::invalid_arguments(format!("'{value}' is not a timeout in milliseconds"))
            })?,
        };
        self.notify(Notification::Popup {
            title,
            message,
            timeout_ms,
        });
        Ok(Reply::default())
    }
}
