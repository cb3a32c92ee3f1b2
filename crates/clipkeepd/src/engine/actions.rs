//! Pending and running actions.
//!
//! Pending actions wait for `confirm`; running ones execute on their own
//! thread and report back with [`EngineEvent::ActionFinished`]. Identifiers
//! are never reused while the server runs. At most
//! [`MAX_PENDING_ACTIONS`] wait at a time; queueing another expires the
//! oldest.

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use super::{ENGINE_TARGET, EngineEvent, ReplySender};
use crate::rules::{ActionSpec, CancelToken, ChainExecutor};

/// Pending actions kept before the oldest one expires.
pub(super) const MAX_PENDING_ACTIONS: usize = 32;

struct RunningAction {
    spec: ActionSpec,
    cancel: CancelToken,
    thread: Option<JoinHandle<()>>,
    reply: Option<ReplySender>,
}

/// A finished action handed back to the owner.
pub(super) struct FinishedAction {
    pub(super) spec: ActionSpec,
    pub(super) reply: Option<ReplySender>,
}

/// Result of `queue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Queued {
    pub(super) id: u64,
    /// Oldest pending action, dropped to make room.
    pub(super) expired: Option<u64>,
}

/// Result of `cancel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Cancelled {
    /// A pending action was dropped.
    Dropped,
    /// A running action was asked to stop.
    Stopping,
}

#[derive(Default)]
pub(super) struct ActionTable {
    next_id: u64,
    pending: BTreeMap<u64, ActionSpec>,
    running: BTreeMap<u64, RunningAction>,
}

impl ActionTable {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Parks an action until it is confirmed.
    pub(super) fn queue(&mut self, spec: ActionSpec) -> Queued {
        let id = self.allocate();
        debug!(target: ENGINE_TARGET, id, command = %spec.command_line(), "action pending");
        self.pending.insert(id, spec);
        let expired = if self.pending.len() > MAX_PENDING_ACTIONS {
            self.pending.pop_first().map(|(oldest, _)| oldest)
        } else {
            None
        };
        if let Some(oldest) = expired {
            info!(target: ENGINE_TARGET, id = oldest, "pending action expired");
        }
        Queued { id, expired }
    }

    pub(super) fn take_pending(&mut self, id: u64) -> Option<ActionSpec> {
        self.pending.remove(&id)
    }

    /// Starts `spec` on a new thread. The reply sender is only taken once
    /// the thread is running.
    pub(super) fn start(
        &mut self,
        spec: ActionSpec,
        reply: &mut Option<ReplySender>,
        executor: Arc<dyn ChainExecutor>,
        events: Sender<EngineEvent>,
    ) -> io::Result<u64> {
        let id = self.allocate();
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let request = spec.request();
        let thread = thread::Builder::new()
            .name(format!("clipkeep-action-{id}"))
            .spawn(move || {
                let output = executor.run(&request, &token);
                if events
                    .send(EngineEvent::ActionFinished { id, output })
                    .is_err()
                {
                    debug!(target: ENGINE_TARGET, id, "engine gone before action finished");
                }
            })?;
        info!(target: ENGINE_TARGET, id, command = %spec.command_line(), "action started");
        self.running.insert(
            id,
            RunningAction {
                spec,
                cancel,
                thread: Some(thread),
                reply: reply.take(),
            },
        );
        Ok(id)
    }

    /// Removes a finished action and joins its thread.
    pub(super) fn finish(&mut self, id: u64) -> Option<FinishedAction> {
        let mut action = self.running.remove(&id)?;
        join(id, action.thread.take());
        Some(FinishedAction {
            spec: action.spec,
            reply: action.reply,
        })
    }

    pub(super) fn cancel(&mut self, id: u64) -> Option<Cancelled> {
        if self.pending.remove(&id).is_some() {
            info!(target: ENGINE_TARGET, id, "pending action dropped");
            return Some(Cancelled::Dropped);
        }
        let action = self.running.get(&id)?;
        action.cancel.cancel();
        info!(target: ENGINE_TARGET, id, "running action cancelled");
        Some(Cancelled::Stopping)
    }

    /// One line per action: id, state, rule name and command line.
    pub(super) fn listing(&self) -> String {
        let pending = self.pending.iter().map(|(id, spec)| (id, "pending", spec));
        let running = self
            .running
            .iter()
            .map(|(id, action)| (id, "running", &action.spec));
        let mut lines: Vec<_> = pending.chain(running).collect();
        lines.sort_by_key(|(id, _, _)| **id);
        lines
            .into_iter()
            .map(|(id, state, spec)| {
                let name = if spec.name.is_empty() { "-" } else { &spec.name };
                format!("{id}\t{state}\t{name}\t{}\n", spec.command_line())
            })
            .collect()
    }

    pub(super) fn running_count(&self) -> usize {
        self.running.len()
    }

    /// Cancels every running action, joins their threads and drops pending
    /// ones. Waiting sessions see their reply channel close.
    pub(super) fn stop_all(&mut self) {
        self.pending.clear();
        for action in self.running.values() {
            action.cancel.cancel();
        }
        for (id, mut action) in std::mem::take(&mut self.running) {
            join(id, action.thread.take());
        }
    }
}

fn join(id: u64, thread: Option<JoinHandle<()>>) {
    if let Some(thread) = thread
        && thread.join().is_err()
    {
        warn!(target: ENGINE_TARGET, id, "action thread panicked");
    }
}
