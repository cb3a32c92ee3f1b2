//! Test double for [`HealthReporter`] that records structured events for assertions.

use std::sync::Mutex;

use clipkeep_config::Config;

use crate::bootstrap::BootstrapError;
use crate::health::HealthReporter;
use crate::history::TabLoadFailure;
use crate::rules::RuleProblem;
use crate::watcher::WatcherState;

/// Structured health events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    BootstrapStarting,
    BootstrapSucceeded,
    BootstrapFailed(String),
    WatcherState(String),
    WatcherCrashed(u32),
    WatcherGaveUp(u32),
    HistoryCorrupted(String),
    RuleRejected(String),
}

/// Records health events for assertions.
#[derive(Debug, Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.record(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn watcher_state(&self, state: WatcherState) {
        self.record(HealthEvent::WatcherState(state.to_string()));
    }

    fn watcher_crashed(&self, failures: u32, _reason: &str) {
        self.record(HealthEvent::WatcherCrashed(failures));
    }

    fn watcher_gave_up(&self, failures: u32) {
        self.record(HealthEvent::WatcherGaveUp(failures));
    }

    fn history_corrupted(&self, failure: &TabLoadFailure) {
        self.record(HealthEvent::HistoryCorrupted(failure.tab.clone()));
    }

    fn rule_rejected(&self, problem: &RuleProblem) {
        self.record(HealthEvent::RuleRejected(problem.name.clone()));
    }
}
