//! Structured health reporting for server lifecycle events.

use std::sync::Arc;

use clipkeep_config::Config;

use crate::bootstrap::BootstrapError;
use crate::history::TabLoadFailure;
use crate::rules::RuleProblem;
use crate::watcher::WatcherState;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked after every watcher state transition.
    fn watcher_state(&self, state: WatcherState);

    /// Invoked when the watcher failed to start or died.
    fn watcher_crashed(&self, failures: u32, reason: &str);

    /// Invoked when the supervisor stops restarting the watcher.
    fn watcher_gave_up(&self, failures: u32);

    /// Invoked for every tab whose history file could not be read.
    fn history_corrupted(&self, failure: &TabLoadFailure);

    /// Invoked for every rule disabled while loading the rules file.
    fn rule_rejected(&self, problem: &RuleProblem);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter + ?Sized,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn watcher_state(&self, state: WatcherState) {
        (**self).watcher_state(state);
    }

    fn watcher_crashed(&self, failures: u32, reason: &str) {
        (**self).watcher_crashed(failures, reason);
    }

    fn watcher_gave_up(&self, failures: u32) {
        (**self).watcher_gave_up(failures);
    }

    fn history_corrupted(&self, failure: &TabLoadFailure) {
        (**self).history_corrupted(failure);
    }

    fn rule_rejected(&self, problem: &RuleProblem) {
        (**self).rule_rejected(problem);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting server bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            socket = %config.daemon_socket(),
            data_dir = %config.data_dir(),
            watcher = config.watcher_program(),
            log_filter = %config.log_filter(),
            log_format = ?config.log_format(),
            "server bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "server bootstrap failed"
        );
    }

    fn watcher_state(&self, state: WatcherState) {
        tracing::debug!(
            target: HEALTH_TARGET,
            event = "watcher_state",
            state = %state,
            "clipboard monitor state changed"
        );
    }

    fn watcher_crashed(&self, failures: u32, reason: &str) {
        tracing::warn!(
            target: HEALTH_TARGET,
            event = "watcher_crashed",
            failures,
            reason,
            "clipboard monitor stopped unexpectedly"
        );
    }

    fn watcher_gave_up(&self, failures: u32) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "watcher_gave_up",
            failures,
            "cannot start clipboard monitor"
        );
    }

    fn history_corrupted(&self, failure: &TabLoadFailure) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "history_corrupted",
            tab = %failure.tab,
            error = %failure.error,
            "history file unreadable; tab starts empty"
        );
    }

    fn rule_rejected(&self, problem: &RuleProblem) {
        tracing::warn!(
            target: HEALTH_TARGET,
            event = "rule_rejected",
            index = problem.index,
            rule = %problem.name,
            defect = %problem.defect,
            "rule disabled"
        );
    }
}
