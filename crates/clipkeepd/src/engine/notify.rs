//! Fan-out of notifications to interactive sessions.

use std::sync::mpsc::Sender;

use clipkeep_types::session::Notification;
use tracing::debug;

use super::ENGINE_TARGET;

/// Interactive sessions currently listening.
#[derive(Debug, Default)]
pub(crate) struct Subscribers {
    senders: Vec<Sender<Notification>>,
}

impl Subscribers {
    pub(crate) fn add(&mut self, sender: Sender<Notification>) {
        self.senders.push(sender);
    }

    /// Sends `event` to every subscriber and prunes those that hung up.
    pub(crate) fn broadcast(&mut self, event: &Notification) {
        let before = self.senders.len();
        self.senders
            .retain(|sender| sender.send(event.clone()).is_ok());
        let pruned = before - self.senders.len();
        if pruned > 0 {
            debug!(target: ENGINE_TARGET, pruned, "dropped closed subscribers");
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.senders.len()
    }
}
