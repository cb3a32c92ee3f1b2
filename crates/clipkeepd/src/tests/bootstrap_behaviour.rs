//! Behavioural coverage of the bootstrap sequence without the process layer.

use std::cell::RefCell;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Instant;

use clipkeep_types::session::Notification;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use crate::bootstrap::{BootstrapError, Collaborators, ConfigLoader, Server, bootstrap_with};
use crate::health::HealthReporter;
use crate::rules::ProcessChainRunner;
use crate::tests::support::{
    FailingConfigLoader, HealthEvent, PipeLauncher, RecordingHealthReporter,
    TestConfigLoader, WAIT_TIMEOUT, WatcherEnd,
};

type StepResult = Result<(), String>;

struct BootstrapWorld {
    loader: TestConfigLoader,
    failing_config: bool,
    reporter: Arc<RecordingHealthReporter>,
    server: Option<Server>,
    error: Option<BootstrapError>,
    launched: Option<Receiver<WatcherEnd>>,
}

impl BootstrapWorld {
    fn new() -> Self {
        Self {
            loader: TestConfigLoader::new(),
            failing_config: false,
            reporter: Arc::new(RecordingHealthReporter::default()),
            server: None,
            error: None,
            launched: None,
        }
    }

    fn bootstrap(&mut self) {
        let loader: &dyn ConfigLoader = if self.failing_config {
            &FailingConfigLoader
        } else {
            &self.loader
        };
        let (launcher, launched) = PipeLauncher::new();
        self.launched = Some(launched);
        let collaborators = Collaborators {
            launcher,
            executor: Arc::new(ProcessChainRunner),
            on_exit: Box::new(|| {}),
        };
        let reporter = Arc::clone(&self.reporter) as Arc<dyn HealthReporter>;
        match bootstrap_with(loader, reporter, collaborators) {
            Ok(server) => self.server = Some(server),
            Err(error) => self.error = Some(error),
        }
    }

    fn server(&self) -> Result<&Server, String> {
        self.server
            .as_ref()
            .ok_or_else(|| format!("bootstrap failed: {:?}", self.error))
    }

    fn run(&self, command: &str, arguments: &[&str]) -> Result<String, String> {
        let reply = self
            .server()?
            .handle()
            .execute(
                command,
                arguments.iter().map(|arg| arg.as_bytes().to_vec()).collect(),
            )
            .map_err(|error| error.to_string())?;
        String::from_utf8(reply.stdout).map_err(|error| error.to_string())
    }

    fn shutdown(&mut self) {
        if let Some(server) = self.server.take() {
            server.shutdown();
        }
    }
}

impl Drop for BootstrapWorld {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[fixture]
fn world() -> RefCell<BootstrapWorld> {
    RefCell::new(BootstrapWorld::new())
}

#[given("a fresh data directory")]
fn given_fresh_data(world: &RefCell<BootstrapWorld>) {
    let _ = world;
}

#[given("a configuration that cannot be loaded")]
fn given_failing_config(world: &RefCell<BootstrapWorld>) {
    world.borrow_mut().failing_config = true;
}

#[given("the clipboard history file is corrupted")]
fn given_corrupted_history(world: &RefCell<BootstrapWorld>) {
    let world = world.borrow();
    let path = world.loader.history_file("clipboard");
    world.loader.write_data_file(&path, b"definitely not a history file");
}

#[given("a rules file with a rule {name} using an invalid pattern")]
fn given_invalid_rule(world: &RefCell<BootstrapWorld>, name: String) {
    let name = name.trim_matches('"');
    let rules = format!("[[rule]]\nname = \"{name}\"\nmatch = \"([unclosed\"\nignore = true\n");
    let world = world.borrow();
    let path = world.loader.storage().rules_path().to_path_buf();
    world.loader.write_data_file(&path, rules.as_bytes());
}

#[given("the server core ran once and stored {first} and {second}")]
fn given_previous_run(
    world: &RefCell<BootstrapWorld>,
    first: String,
    second: String,
) -> StepResult {
    let mut world = world.borrow_mut();
    world.bootstrap();
    world.run("add", &[first.trim_matches('"')])?;
    world.run("add", &[second.trim_matches('"')])?;
    world.shutdown();
    world.reporter = Arc::new(RecordingHealthReporter::default());
    Ok(())
}

#[when("the server core bootstraps")]
fn when_bootstrap(world: &RefCell<BootstrapWorld>) {
    world.borrow_mut().bootstrap();
}

#[then("bootstrap succeeds")]
fn then_bootstrap_succeeds(world: &RefCell<BootstrapWorld>) -> StepResult {
    world.borrow().server().map(|_| ())
}

#[then("bootstrap fails with a configuration error")]
fn then_configuration_error(world: &RefCell<BootstrapWorld>) {
    let world = world.borrow();
    assert!(
        matches!(world.error, Some(BootstrapError::Configuration { .. })),
        "expected a configuration error, got {:?}",
        world.error
    );
}

#[then("the health reporter saw bootstrap start and success")]
fn then_reporter_success(world: &RefCell<BootstrapWorld>) {
    let events = world.borrow().reporter.events();
    assert_eq!(events.first(), Some(&HealthEvent::BootstrapStarting));
    assert!(
        events.contains(&HealthEvent::BootstrapSucceeded),
        "events: {events:?}"
    );
}

#[then("the health reporter saw a bootstrap failure")]
fn then_reporter_failure(world: &RefCell<BootstrapWorld>) {
    let events = world.borrow().reporter.events();
    assert!(
        events
            .iter()
            .any(|event| matches!(event, HealthEvent::BootstrapFailed(_))),
        "events: {events:?}"
    );
}

#[then("the health reporter saw corrupted history for tab {tab}")]
fn then_reporter_corruption(world: &RefCell<BootstrapWorld>, tab: String) {
    let expected = HealthEvent::HistoryCorrupted(tab.trim_matches('"').to_owned());
    let events = world.borrow().reporter.events();
    assert!(events.contains(&expected), "events: {events:?}");
}

#[then("the health reporter saw rule {name} rejected")]
fn then_reporter_rule(world: &RefCell<BootstrapWorld>, name: String) {
    let expected = HealthEvent::RuleRejected(name.trim_matches('"').to_owned());
    let events = world.borrow().reporter.events();
    assert!(events.contains(&expected), "events: {events:?}");
}

#[then("the clipboard tab holds {count} items")]
fn then_tab_count(world: &RefCell<BootstrapWorld>, count: usize) -> StepResult {
    let output = world.borrow().run("count", &[])?;
    assert_eq!(output, format!("{count}\n"));
    Ok(())
}

#[then("row {row} of the clipboard tab reads {text}")]
fn then_row_reads(world: &RefCell<BootstrapWorld>, row: usize, text: String) -> StepResult {
    let output = world.borrow().run("read", &[&row.to_string()])?;
    assert_eq!(output, text.trim_matches('"'));
    Ok(())
}

#[then("a new session is warned about {subject}")]
fn then_session_warned(world: &RefCell<BootstrapWorld>, subject: String) -> StepResult {
    let subject = subject.trim_matches('"');
    let world = world.borrow();
    let notifications = world
        .server()?
        .handle()
        .subscribe()
        .map_err(|error| error.to_string())?;
    let deadline = Instant::now() + WAIT_TIMEOUT;
    while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
        match notifications.recv_timeout(remaining) {
            Ok(Notification::Warning { message }) if message.contains(subject) => return Ok(()),
            Ok(_) => {}
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => break,
        }
    }
    Err(format!("no warning mentioning {subject}"))
}

#[scenario(path = "tests/features/server_bootstrap.feature")]
fn server_bootstrap(#[from(world)] _: RefCell<BootstrapWorld>) -> Result<(), String> {
    Ok(())
}
