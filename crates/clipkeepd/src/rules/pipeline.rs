//! Automatic rule evaluation for one snapshot.

use std::sync::Arc;

use clipkeep_types::MimeData;
use tracing::{debug, info};

use super::RULES_TARGET;
use super::action::{ActionSpec, output_mime, script_for, split_output};
use super::chain::{CancelToken, ChainExecutor, ChainOutput, ChainRequest};
use super::matcher::substitute_stages;
use super::model::{RuleAction, RuleSet};
use crate::watcher::Snapshot;

/// A snapshot queued for evaluation with the rules current at enqueue time.
#[derive(Debug, Clone)]
pub struct PipelineJob {
    /// Filtered snapshot.
    pub snapshot: Snapshot,
    /// Rules to evaluate.
    pub rules: Arc<RuleSet>,
}

/// Items a rule created for a destination tab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedItems {
    /// Rule that produced them.
    pub rule: String,
    /// Destination tab; `None` = current tab.
    pub tab: Option<String>,
    /// Items in output order.
    pub items: Vec<MimeData>,
}

/// A chain that ended without success during evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleFailure {
    /// Rule name.
    pub rule: String,
    /// Result of the chain.
    pub output: ChainOutput,
}

/// Everything one snapshot's evaluation commits, applied as one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitGroup {
    /// The (possibly transformed) snapshot content for the current tab.
    pub item: MimeData,
    /// Items created by rules.
    pub created: Vec<CreatedItems>,
    /// Scripts queued by script rules, in rule order.
    pub scripts: Vec<String>,
    /// Actions awaiting confirmation.
    pub pending: Vec<ActionSpec>,
    /// Chains that failed; surfaced as warnings.
    pub failures: Vec<RuleFailure>,
}

impl CommitGroup {
    fn new(item: MimeData) -> Self {
        Self {
            item,
            created: Vec::new(),
            scripts: Vec::new(),
            pending: Vec::new(),
            failures: Vec::new(),
        }
    }
}

/// Result of evaluating one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// An `ignore` rule matched; nothing is committed.
    Ignored {
        /// The matching rule.
        rule: String,
    },
    /// Evaluation was cancelled during shutdown; nothing is committed.
    Cancelled,
    /// Commit this group.
    Commit(CommitGroup),
}

/// Evaluates enabled automatic rules in list order.
///
/// An `ignore` match stops evaluation and discards the snapshot. A
/// `transform` match replaces the content seen by later rules; the window
/// title stays the original one. Other matches run their chain and collect
/// created items, or queue a pending action when the rule asks for
/// confirmation.
pub fn evaluate(
    job: PipelineJob,
    executor: &dyn ChainExecutor,
    cancel: &CancelToken,
) -> PipelineOutcome {
    let PipelineJob { snapshot, rules } = job;
    let title = snapshot.window_title.as_deref();
    let mut group = CommitGroup::new(snapshot.data.clone());

    for rule in rules.automatic() {
        if cancel.is_cancelled() {
            return PipelineOutcome::Cancelled;
        }
        let Some(found) = rule.matches(&group.item, title) else {
            continue;
        };
        debug!(target: RULES_TARGET, rule = %rule.name, "rule matched");
        if rule.ignore {
            info!(target: RULES_TARGET, rule = %rule.name, "snapshot ignored");
            return PipelineOutcome::Ignored {
                rule: rule.name.clone(),
            };
        }
        let stages = match &rule.action {
            RuleAction::None => continue,
            RuleAction::Script(script) => {
                group.scripts.push(script_for(script, &found));
                continue;
            }
            RuleAction::Chain(stages) => stages,
        };
        let input = rule.input_bytes(&group.item);
        if rule.wait && !rule.transform {
            group
                .pending
                .push(ActionSpec::from_rule(rule, stages, &found, input));
            continue;
        }
        let request = ChainRequest {
            stages: substitute_stages(stages, &found),
            input: Some(input),
            timeout: rule.timeout,
        };
        let output = executor.run(&request, cancel);
        if output.was_stopped() && cancel.is_cancelled() {
            return PipelineOutcome::Cancelled;
        }
        if !output.succeeded() {
            group.failures.push(RuleFailure {
                rule: rule.name.clone(),
                output,
            });
            continue;
        }
        if rule.transform {
            group.item.insert(output_mime(rule), output.stdout);
        } else {
            group.created.push(CreatedItems {
                rule: rule.name.clone(),
                tab: rule.tab.clone(),
                items: split_output(&output.stdout, Some(&rule.separator), &output_mime(rule)),
            });
        }
    }
    PipelineOutcome::Commit(group)
}
