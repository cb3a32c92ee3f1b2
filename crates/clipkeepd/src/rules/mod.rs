//! Automation rules and the external-process machinery behind them.
//!
//! Rules are loaded from `rules.toml` into a [`RuleSet`]. Enabled automatic
//! rules are evaluated for every stored snapshot by the [`PipelineWorker`],
//! strictly in list order; the same rules, automatic or not, can be run on
//! demand against history items. Chains of external programs run through a
//! [`ChainExecutor`] with explicit argv lists and engine-managed pipes, never
//! through a shell.

mod action;
mod chain;
pub(crate) mod command_line;
mod matcher;
mod model;
mod pipeline;
mod worker;

pub use action::{ActionSpec, ActionTarget, output_mime, script_for, split_output};
pub use chain::{
    CANCELLED_CODE, CancelToken, ChainExecutor, ChainOutput, ChainRequest, ChainStatus,
    KILL_GRACE, ProcessChainRunner, SPAWN_FAILED_CODE, TIMED_OUT_CODE, run_chain,
};
pub use matcher::{RuleMatch, substitute, substitute_stages, uses_text_placeholder};
pub use model::{
    Rule, RuleAction, RuleDefect, RuleDefinition, RuleProblem, RuleSet, RulesError,
};
pub use pipeline::{
    CommitGroup, CreatedItems, PipelineJob, PipelineOutcome, RuleFailure, evaluate,
};
pub use worker::{PipelineSink, PipelineWorker};

pub(crate) const RULES_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::rules");

#[cfg(test)]
mod tests;
