//! Rule definitions as written in `rules.toml` and their compiled form.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use super::RULES_TARGET;
use super::command_line::{CommandLineError, parse_chain};

const DEFAULT_SEPARATOR: &str = "\n";

/// Errors that prevent the rules file from loading at all.
#[derive(Debug, Error)]
pub enum RulesError {
    /// The file exists but could not be read.
    #[error("failed to read rules file '{path}': {source}")]
    Read {
        /// Rules file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// The file is not valid TOML or does not follow the rule schema.
    #[error("failed to parse rules file '{path}': {source}")]
    Parse {
        /// Rules file.
        path: PathBuf,
        /// Parser error.
        #[source]
        source: Box<toml::de::Error>,
    },
}

/// Reasons a single rule is rejected and disabled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleDefect {
    /// A regular expression failed to compile.
    #[error("invalid {field} pattern: {message}")]
    Pattern {
        /// Which pattern (`match` or `window`).
        field: &'static str,
        /// Compiler message.
        message: String,
    },
    /// `ignore` and `transform` were both set.
    #[error("'ignore' and 'transform' cannot be combined")]
    IgnoreWithTransform,
    /// More than one of `chain`, `command` and `script` was given.
    #[error("only one of 'chain', 'command' and 'script' may be set")]
    ConflictingActions,
    /// The command line could not be split.
    #[error("invalid command: {0}")]
    Command(#[from] CommandLineError),
    /// A chain stage had no program.
    #[error("chain stage {stage} is empty")]
    EmptyStage {
        /// Zero-based stage index.
        stage: usize,
    },
}

/// A rule that failed validation, reported at load time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleProblem {
    /// Position in the rules file.
    pub index: usize,
    /// Rule name.
    pub name: String,
    /// What is wrong with it.
    pub defect: RuleDefect,
}

#[derive(Debug, Default, Deserialize)]
struct RulesFile {
    #[serde(default, rename = "rule")]
    rules: Vec<RuleDefinition>,
}

/// One `[[rule]]` table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuleDefinition {
    /// Display name, also used by `run NAME`.
    pub name: String,
    /// Disabled rules never match.
    pub enabled: Option<bool>,
    /// Evaluated for every new snapshot.
    pub automatic: bool,
    /// Content pattern searched in the item text.
    #[serde(rename = "match")]
    pub content: Option<String>,
    /// Window title pattern.
    pub window: Option<String>,
    /// Format that must be present; its payload feeds the chain.
    pub input: Option<String>,
    /// Format of created or transformed content.
    pub output: Option<String>,
    /// Chain stages as argv lists.
    pub chain: Option<Vec<Vec<String>>>,
    /// Chain as a single command line with `|` between stages.
    pub command: Option<String>,
    /// Script run through `eval` instead of a chain.
    pub script: Option<String>,
    /// Splits command output into items.
    pub separator: Option<String>,
    /// Destination tab for created items.
    pub tab: Option<String>,
    /// Ask for confirmation before running.
    pub wait: bool,
    /// Hide the main window after an interactive run.
    pub hide_window: bool,
    /// Replace the item content with the output.
    pub transform: bool,
    /// Drop the item.
    pub ignore: bool,
    /// Wall-clock limit for the chain.
    pub timeout_ms: Option<u64>,
}

/// What a matching rule executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleAction {
    /// Nothing; useful for `ignore` rules.
    None,
    /// External process chain.
    Chain(Vec<Vec<String>>),
    /// Script passed to `eval`.
    Script(String),
}

/// Compiled automation rule.
#[derive(Debug, Clone)]
pub struct Rule {
    /// Display name.
    pub name: String,
    /// Disabled rules never match.
    pub enabled: bool,
    /// Evaluated for every new snapshot.
    pub automatic: bool,
    /// Content pattern.
    pub content: Option<Regex>,
    /// Window title pattern.
    pub window: Option<Regex>,
    /// Required input format.
    pub input: Option<String>,
    /// Format of produced content.
    pub output: Option<String>,
    /// What runs on a match.
    pub action: RuleAction,
    /// Output separator.
    pub separator: String,
    /// Destination tab; `None` means the current tab.
    pub tab: Option<String>,
    /// Needs confirmation.
    pub wait: bool,
    /// Hide the window after interactive runs.
    pub hide_window: bool,
    /// Replace content in place.
    pub transform: bool,
    /// Drop the item.
    pub ignore: bool,
    /// Chain time limit.
    pub timeout: Option<Duration>,
}

impl Rule {
    /// Compiles a definition.
    ///
    /// # Errors
    ///
    /// Returns the first defect found.
    pub fn compile(definition: RuleDefinition) -> Result<Self, RuleDefect> {
        if definition.ignore && definition.transform {
            return Err(RuleDefect::IgnoreWithTransform);
        }
        let content = compile_pattern("match", definition.content.as_deref())?;
        let window = compile_pattern("window", definition.window.as_deref())?;
        let action = match (definition.chain, definition.command, definition.script) {
            (None, None, None) => RuleAction::None,
            (Some(stages), None, None) => RuleAction::Chain(check_stages(stages)?),
            (None, Some(command), None) => RuleAction::Chain(parse_chain(&command)?),
            (None, None, Some(script)) => RuleAction::Script(script),
            _ => return Err(RuleDefect::ConflictingActions),
        };
        Ok(Self {
            name: definition.name,
            enabled: definition.enabled.unwrap_or(true),
            automatic: definition.automatic,
            content,
            window,
            input: definition.input.filter(|mime| !mime.is_empty()),
            output: definition.output.filter(|mime| !mime.is_empty()),
            action,
            separator: definition
                .separator
                .unwrap_or_else(|| DEFAULT_SEPARATOR.to_owned()),
            tab: definition.tab.filter(|tab| !tab.is_empty()),
            wait: definition.wait,
            hide_window: definition.hide_window,
            transform: definition.transform,
            ignore: definition.ignore,
            timeout: definition.timeout_ms.map(Duration::from_millis),
        })
    }

    fn disabled(name: String) -> Self {
        Self {
            name,
            enabled: false,
            automatic: false,
            content: None,
            window: None,
            input: None,
            output: None,
            action: RuleAction::None,
            separator: DEFAULT_SEPARATOR.to_owned(),
            tab: None,
            wait: false,
            hide_window: false,
            transform: false,
            ignore: false,
            timeout: None,
        }
    }

    /// True for rules whose action is an `eval` script.
    #[must_use]
    pub const fn is_script(&self) -> bool {
        matches!(self.action, RuleAction::Script(_))
    }

    /// Short flag summary used by the `rules` listing.
    #[must_use]
    pub fn flags(&self) -> String {
        let flags: Vec<&str> = [
            (self.automatic, "automatic"),
            (self.wait, "wait"),
            (self.transform, "transform"),
            (self.ignore, "ignore"),
            (self.hide_window, "hide_window"),
            (self.is_script(), "script"),
        ]
        .into_iter()
        .filter_map(|(set, name)| set.then_some(name))
        .collect();
        if flags.is_empty() {
            "-".to_owned()
        } else {
            flags.join(",")
        }
    }
}

fn compile_pattern(field: &'static str, pattern: Option<&str>) -> Result<Option<Regex>, RuleDefect> {
    match pattern {
        None | Some("") => Ok(None),
        Some(source) => Regex::new(source)
            .map(Some)
            .map_err(|error| RuleDefect::Pattern {
                field,
                message: error.to_string(),
            }),
    }
}

fn check_stages(stages: Vec<Vec<String>>) -> Result<Vec<Vec<String>>, RuleDefect> {
    if stages.is_empty() {
        return Err(RuleDefect::Command(CommandLineError::Empty));
    }
    if let Some(stage) = stages.iter().position(|argv| argv.first().is_none_or(String::is_empty)) {
        return Err(RuleDefect::EmptyStage { stage });
    }
    Ok(stages)
}

/// Ordered rules plus the problems found while loading them.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
    problems: Vec<RuleProblem>,
}

impl RuleSet {
    /// Compiles definitions in order. Defective rules stay in the list,
    /// disabled, so positions match the file.
    #[must_use]
    pub fn from_definitions(definitions: Vec<RuleDefinition>) -> Self {
        let mut set = Self::default();
        for (index, definition) in definitions.into_iter().enumerate() {
            let name = definition.name.clone();
            match Rule::compile(definition) {
                Ok(rule) => set.rules.push(rule),
                Err(defect) => {
                    warn!(
                        target: RULES_TARGET,
                        index,
                        rule = %name,
                        error = %defect,
                        "rule disabled"
                    );
                    set.rules.push(Rule::disabled(name.clone()));
                    set.problems.push(RuleProblem {
                        index,
                        name,
                        defect,
                    });
                }
            }
        }
        set
    }

    /// Parses rules from TOML text.
    ///
    /// # Errors
    ///
    /// Fails when the text does not follow the schema.
    pub fn parse(text: &str, path: &Path) -> Result<Self, RulesError> {
        let file: RulesFile = toml::from_str(text).map_err(|source| RulesError::Parse {
            path: path.to_path_buf(),
            source: Box::new(source),
        })?;
        Ok(Self::from_definitions(file.rules))
    }

    /// Loads `rules.toml`; a missing file yields an empty set.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, RulesError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(RulesError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let set = Self::parse(&text, path)?;
        info!(
            target: RULES_TARGET,
            rules = set.rules.len(),
            rejected = set.problems.len(),
            file = %path.display(),
            "rules loaded"
        );
        Ok(set)
    }

    /// All rules in evaluation order.
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Enabled automatic rules in evaluation order.
    pub fn automatic(&self) -> impl Iterator<Item = &Rule> {
        self.rules
            .iter()
            .filter(|rule| rule.enabled && rule.automatic)
    }

    /// Finds a rule by name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|rule| rule.name == name)
    }

    /// Problems found while loading.
    #[must_use]
    pub fn problems(&self) -> &[RuleProblem] {
        &self.problems
    }
}
