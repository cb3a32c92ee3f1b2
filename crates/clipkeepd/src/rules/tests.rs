//! Unit tests for rule loading, matching and automatic evaluation.

use std::path::Path;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clipkeep_types::{MimeData, Source};
use rstest::{fixture, rstest};

use super::*;
use crate::watcher::Snapshot;

type Responder = dyn Fn(&ChainRequest) -> ChainOutput + Send + Sync;

/// Executor answering from a closure and recording every request.
struct ScriptedExecutor {
    requests: Mutex<Vec<ChainRequest>>,
    respond: Box<Responder>,
}

impl ScriptedExecutor {
    fn new(respond: impl Fn(&ChainRequest) -> ChainOutput + Send + Sync + 'static) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            respond: Box::new(respond),
        }
    }

    fn echoing_input() -> Self {
        Self::new(|request| exited(0, request.input.clone().unwrap_or_default()))
    }

    fn requests(&self) -> Vec<ChainRequest> {
        self.requests.lock().expect("requests mutex").clone()
    }
}

impl ChainExecutor for ScriptedExecutor {
    fn run(&self, request: &ChainRequest, _cancel: &CancelToken) -> ChainOutput {
        self.requests
            .lock()
            .expect("requests mutex")
            .push(request.clone());
        (self.respond)(request)
    }
}

fn exited(code: i32, stdout: impl Into<Vec<u8>>) -> ChainOutput {
    ChainOutput {
        status: ChainStatus::Exited(code),
        stdout: stdout.into(),
        stderr: Vec::new(),
    }
}

fn rules(toml: &str) -> Arc<RuleSet> {
    Arc::new(RuleSet::parse(toml, Path::new("rules.toml")).expect("rules should parse"))
}

fn job(text: &str, title: Option<&str>, rules: &Arc<RuleSet>) -> PipelineJob {
    PipelineJob {
        snapshot: Snapshot {
            source: Source::Clipboard,
            window_title: title.map(str::to_owned),
            data: MimeData::from_text(text),
        },
        rules: Arc::clone(rules),
    }
}

fn commit_group(outcome: PipelineOutcome) -> CommitGroup {
    match outcome {
        PipelineOutcome::Commit(group) => group,
        other => panic!("expected a commit group, got {other:?}"),
    }
}

#[fixture]
fn link_rules() -> Arc<RuleSet> {
    rules(
        r#"
        [[rule]]
        name = "fetch links"
        automatic = true
        match = "^https?://"
        chain = [["curl", "-s", "%1"]]
        separator = "\n"
        tab = "links"
        "#,
    )
}

#[rstest]
fn url_rule_creates_items_and_keeps_original(link_rules: Arc<RuleSet>) {
    let executor = ScriptedExecutor::new(|_| exited(0, "first line\n\nsecond line\n"));
    let group = commit_group(evaluate(
        job("http://example.com", None, &link_rules),
        &executor,
        &CancelToken::new(),
    ));

    assert_eq!(group.item.text().as_deref(), Some("http://example.com"));
    let created = group.created.first().expect("created items");
    assert_eq!(created.tab.as_deref(), Some("links"));
    let texts: Vec<String> = created.items.iter().map(MimeData::text_or_empty).collect();
    assert_eq!(texts, ["first line", "second line"]);
    let request = executor.requests().pop().expect("one request");
    assert_eq!(request.stages, vec![vec!["curl", "-s", "http://example.com"]]);
}

#[rstest]
fn non_matching_content_runs_nothing(link_rules: Arc<RuleSet>) {
    let executor = ScriptedExecutor::echoing_input();
    let group = commit_group(evaluate(
        job("plain words", None, &link_rules),
        &executor,
        &CancelToken::new(),
    ));
    assert!(group.created.is_empty());
    assert!(executor.requests().is_empty());
}

#[test]
fn ignore_stops_evaluation() {
    let set = rules(
        r#"
        [[rule]]
        name = "upper"
        automatic = true
        transform = true
        chain = [["upper"]]

        [[rule]]
        name = "drop secrets"
        automatic = true
        match = "SECRET"
        ignore = true

        [[rule]]
        name = "never"
        automatic = true
        chain = [["never"]]
        "#,
    );
    let executor = ScriptedExecutor::new(|request| {
        let input = request.input.clone().unwrap_or_default();
        exited(0, String::from_utf8_lossy(&input).to_uppercase())
    });
    let outcome = evaluate(job("a secret", None, &set), &executor, &CancelToken::new());
    assert_eq!(
        outcome,
        PipelineOutcome::Ignored {
            rule: "drop secrets".to_owned()
        }
    );
    let programs: Vec<String> = executor
        .requests()
        .iter()
        .filter_map(|request| request.stages.first()?.first().cloned())
        .collect();
    assert_eq!(programs, ["upper"]);
}

#[test]
fn later_rules_see_transformed_content_and_original_title() {
    let set = rules(
        r#"
        [[rule]]
        name = "trim"
        automatic = true
        transform = true
        chain = [["trim"]]

        [[rule]]
        name = "notes from editor"
        automatic = true
        match = "^note: (.*)$"
        window = "Editor"
        chain = [["store", "%2"]]
        tab = "notes"
        "#,
    );
    let executor = ScriptedExecutor::new(|request| {
        let program = request.stages.first().and_then(|stage| stage.first()).cloned();
        match program.as_deref() {
            Some("trim") => {
                let input = request.input.clone().unwrap_or_default();
                exited(0, String::from_utf8_lossy(&input).trim().to_owned())
            }
            _ => exited(0, "stored"),
        }
    });
    let group = commit_group(evaluate(
        job("  note: buy milk  ", Some("Text Editor"), &set),
        &executor,
        &CancelToken::new(),
    ));
    assert_eq!(group.item.text().as_deref(), Some("note: buy milk"));
    let store = executor.requests().pop().expect("second rule ran");
    assert_eq!(store.stages, vec![vec!["store", "buy milk"]]);
    assert_eq!(group.created.len(), 1);
}

#[test]
fn title_rules_never_match_untitled_snapshots() {
    let set = rules(
        r#"
        [[rule]]
        name = "terminal"
        automatic = true
        window = "Terminal"
        ignore = true
        "#,
    );
    let executor = ScriptedExecutor::echoing_input();
    let outcome = evaluate(job("ls", None, &set), &executor, &CancelToken::new());
    assert!(matches!(outcome, PipelineOutcome::Commit(_)));
}

#[test]
fn wait_rules_become_pending_actions() {
    let set = rules(
        r#"
        [[rule]]
        name = "open"
        automatic = true
        wait = true
        command = "xdg-open %1"
        "#,
    );
    let executor = ScriptedExecutor::echoing_input();
    let group = commit_group(evaluate(
        job("https://example.org", None, &set),
        &executor,
        &CancelToken::new(),
    ));
    assert!(executor.requests().is_empty());
    let pending = group.pending.first().expect("pending action");
    assert_eq!(pending.command_line(), "xdg-open https://example.org");
}

#[test]
fn failed_chains_are_reported_not_committed() {
    let set = rules(
        r#"
        [[rule]]
        name = "broken"
        automatic = true
        chain = [["broken"]]
        "#,
    );
    let executor = ScriptedExecutor::new(|_| exited(2, "partial"));
    let group = commit_group(evaluate(job("x", None, &set), &executor, &CancelToken::new()));
    assert!(group.created.is_empty());
    let failure = group.failures.first().expect("failure recorded");
    assert_eq!(failure.rule, "broken");
    assert_eq!(failure.output.exit_code(), 2);
}

#[test]
fn script_rules_queue_substituted_scripts() {
    let set = rules(
        r#"
        [[rule]]
        name = "mirror"
        automatic = true
        script = "tab mirror add %1"
        "#,
    );
    let executor = ScriptedExecutor::echoing_input();
    let group = commit_group(evaluate(job("abc", None, &set), &executor, &CancelToken::new()));
    assert_eq!(group.scripts, ["tab mirror add abc"]);
}

#[test]
fn mime_filter_requires_the_format() {
    let set = rules(
        r#"
        [[rule]]
        name = "html only"
        automatic = true
        input = "text/html"
        ignore = true
        "#,
    );
    let executor = ScriptedExecutor::echoing_input();
    let outcome = evaluate(job("plain", None, &set), &executor, &CancelToken::new());
    assert!(matches!(outcome, PipelineOutcome::Commit(_)));
}

#[rstest]
#[case("%1", "whole text")]
#[case("%2-%3", "one-two")]
#[case("%4", "%4")]
#[case("100%%", "100%")]
#[case("50% off", "50% off")]
fn substitutes_placeholders(#[case] template: &str, #[case] expected: &str) {
    let found = RuleMatch {
        text: "whole text".to_owned(),
        captures: vec!["one".to_owned(), "two".to_owned()],
    };
    assert_eq!(substitute(template, &found), expected);
}

#[test]
fn numbered_placeholders_stay_literal_without_captures() {
    let found = RuleMatch::text_only("abc");
    assert_eq!(substitute("%1 %2", &found), "abc %2");
}

#[test]
fn defective_rules_are_disabled_in_place() {
    let set = rules(
        r#"
        [[rule]]
        name = "bad regex"
        automatic = true
        match = "("

        [[rule]]
        name = "contradiction"
        automatic = true
        ignore = true
        transform = true

        [[rule]]
        name = "good"
        automatic = true
        ignore = true
        "#,
    );
    assert_eq!(set.rules().len(), 3);
    let problems: Vec<&str> = set.problems().iter().map(|problem| problem.name.as_str()).collect();
    assert_eq!(problems, ["bad regex", "contradiction"]);
    let automatic: Vec<&str> = set.automatic().map(|rule| rule.name.as_str()).collect();
    assert_eq!(automatic, ["good"]);
}

#[test]
fn unknown_keys_fail_the_whole_file() {
    let error = RuleSet::parse("[[rule]]\nname = \"x\"\nbogus = 1\n", Path::new("rules.toml"))
        .expect_err("unknown key");
    assert!(matches!(error, RulesError::Parse { .. }));
}

#[test]
fn missing_rules_file_is_empty() {
    let dir = tempfile::tempdir().expect("temp dir");
    let set = RuleSet::load(&dir.path().join("rules.toml")).expect("missing file is fine");
    assert!(set.rules().is_empty());
}

#[rstest]
#[case("a\nb\n", Some("\n"), &["a", "b"])]
#[case("a,b,,c", Some(","), &["a", "b", "c"])]
#[case("whole\noutput", None, &["whole\noutput"])]
#[case("", Some("\n"), &[])]
fn splits_output_into_items(
    #[case] stdout: &str,
    #[case] separator: Option<&str>,
    #[case] expected: &[&str],
) {
    let items = split_output(stdout.as_bytes(), separator, "text/plain");
    let texts: Vec<String> = items.iter().map(MimeData::text_or_empty).collect();
    assert_eq!(texts, expected);
}

struct ChannelSink {
    outcomes: Mutex<mpsc::Sender<PipelineOutcome>>,
}

impl PipelineSink for ChannelSink {
    fn deliver(&self, outcome: PipelineOutcome) -> bool {
        self.outcomes
            .lock()
            .map(|sender| sender.send(outcome).is_ok())
            .unwrap_or(false)
    }
}

#[test]
fn worker_delivers_in_submission_order() {
    let set = rules(
        r#"
        [[rule]]
        name = "slow first"
        automatic = true
        match = "^one$"
        chain = [["slow"]]
        "#,
    );
    let executor = Arc::new(ScriptedExecutor::new(|_| {
        std::thread::sleep(Duration::from_millis(100));
        exited(0, "from one")
    }));
    let (sender, receiver) = mpsc::channel();
    let worker = PipelineWorker::spawn(
        executor,
        ChannelSink {
            outcomes: Mutex::new(sender),
        },
    )
    .expect("worker starts");
    assert!(worker.submit(job("one", None, &set)));
    assert!(worker.submit(job("two", None, &set)));

    let first = commit_group(receiver.recv_timeout(Duration::from_secs(5)).expect("first"));
    let second = commit_group(receiver.recv_timeout(Duration::from_secs(5)).expect("second"));
    assert_eq!(first.item.text().as_deref(), Some("one"));
    assert_eq!(first.created.len(), 1);
    assert_eq!(second.item.text().as_deref(), Some("two"));
    worker.shutdown();
}
