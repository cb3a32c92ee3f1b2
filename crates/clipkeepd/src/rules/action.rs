//! Fully substituted chains ready to run, and what to do with their output.

use std::time::Duration;

use clipkeep_types::{MimeData, TEXT_PLAIN};

use super::chain::ChainRequest;
use super::command_line::format_chain;
use super::matcher::{RuleMatch, substitute, substitute_stages};
use super::model::Rule;

/// Where the output of an action goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionTarget {
    /// Split stdout into new items for a tab (`None` = current tab).
    Create {
        /// Destination tab.
        tab: Option<String>,
        /// Output separator; `None` keeps the whole output as one item.
        separator: Option<String>,
        /// Format of created items.
        mime: String,
    },
    /// Replace one format of an existing item with stdout.
    Replace {
        /// Tab holding the item.
        tab: String,
        /// Row at the time the action was requested.
        row: usize,
        /// Item content at that time, used to find it again.
        original: MimeData,
        /// Format to replace.
        mime: String,
    },
}

/// An action waiting to run or running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSpec {
    /// Rule name, empty for ad-hoc programs.
    pub name: String,
    /// Substituted chain.
    pub stages: Vec<Vec<String>>,
    /// Stdin for the first stage.
    pub input: Option<Vec<u8>>,
    /// Time limit.
    pub timeout: Option<Duration>,
    /// Output handling.
    pub target: ActionTarget,
    /// Ask user interfaces to hide once the action starts.
    pub hide_window: bool,
}

impl ActionSpec {
    /// Builds the action a rule performs for a match, creating items.
    #[must_use]
    pub fn from_rule(rule: &Rule, stages: &[Vec<String>], found: &RuleMatch, input: Vec<u8>) -> Self {
        Self {
            name: rule.name.clone(),
            stages: substitute_stages(stages, found),
            input: Some(input),
            timeout: rule.timeout,
            target: ActionTarget::Create {
                tab: rule.tab.clone(),
                separator: Some(rule.separator.clone()),
                mime: output_mime(rule),
            },
            hide_window: rule.hide_window,
        }
    }

    /// The command line shown to users and accepted back by `confirm`.
    #[must_use]
    pub fn command_line(&self) -> String {
        format_chain(&self.stages)
    }

    /// The process request for this action.
    #[must_use]
    pub fn request(&self) -> ChainRequest {
        ChainRequest {
            stages: self.stages.clone(),
            input: self.input.clone(),
            timeout: self.timeout,
        }
    }
}

/// Format a rule produces.
#[must_use]
pub fn output_mime(rule: &Rule) -> String {
    rule.output.clone().unwrap_or_else(|| TEXT_PLAIN.to_owned())
}

/// Turns captured output into items.
///
/// Text output is split by `separator` and every non-empty segment becomes
/// an item; other formats, or a missing separator, keep the whole output as
/// a single item. Empty output creates nothing.
#[must_use]
pub fn split_output(stdout: &[u8], separator: Option<&str>, mime: &str) -> Vec<MimeData> {
    if stdout.is_empty() {
        return Vec::new();
    }
    match separator {
        Some(separator) if mime == TEXT_PLAIN && !separator.is_empty() => {
            String::from_utf8_lossy(stdout)
                .split(separator)
                .filter(|segment| !segment.is_empty())
                .map(MimeData::from_text)
                .collect()
        }
        _ => vec![MimeData::new().with(mime, stdout.to_vec())],
    }
}

/// Substitutes `%1` in a script body.
#[must_use]
pub fn script_for(script: &str, found: &RuleMatch) -> String {
    substitute(script, found)
}
