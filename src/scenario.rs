//! Scenario files
//!
//! A scenario declares handlers (each with a scripted action) and a sequence
//! of steps to run against a fresh hub. Handler actions cover the behaviours a
//! hub has to cope with: recording, failing, panicking, and calling back into
//! the hub to subscribe, unsubscribe or publish while a dispatch is running.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use anyhow::{Context, Result};
use log::{debug, info};
use parking_lot::Mutex;
use serde::Deserialize;

use crate::notifications::{
    AsyncHandler, AsyncNotificationHub, DeliveryStats, DispatchReport, EventKind, Handler,
    HandlerFailure, HandlerResult, NotificationHub, SubscriptionToken,
};

/// What a scenario handler does when invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerAction {
    /// Append `name:payload` to the scenario log
    Record,
    /// Return a failure
    Fail,
    /// Panic
    Panic,
    /// Record, then register a recorder called `target` under the same kind
    Subscribe,
    /// Record, then remove every registration of the handler called `target`
    Unsubscribe,
    /// Record, then publish under kind `target`
    Publish,
}

/// A `[[handler]]` entry
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HandlerEntry {
    pub name: String,
    pub kind: EventKind,
    pub action: HandlerAction,
    #[serde(default)]
    pub once: bool,
    pub message: Option<String>,
    pub target: Option<String>,
    /// Payload for nested publishes; the received payload is forwarded when absent
    pub payload: Option<String>,
}

impl HandlerEntry {
    fn target(&self) -> &str {
        self.target.as_deref().unwrap_or_default()
    }

    fn failure_message(&self, verb: &str) -> String {
        self.message.clone().unwrap_or_else(|| format!("{} {}", self.name, verb))
    }
}

/// A `[[step]]` entry
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Step {
    Publish {
        kind: EventKind,
        payload: String,
    },
    Unsubscribe {
        handler: String,
    },
    Clear {
        #[serde(default)]
        kind: Option<EventKind>,
    },
}

/// A parsed and validated scenario
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default, rename = "handler")]
    pub handlers: Vec<HandlerEntry>,
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

impl Scenario {
    /// Read, parse and validate a scenario file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario file: {}", path.display()))?;
        let scenario = Self::parse(&content)
            .with_context(|| format!("Invalid scenario file: {}", path.display()))?;
        info!("Loaded scenario with {} handlers and {} steps from {}",
              scenario.handlers.len(), scenario.steps.len(), path.display());
        Ok(scenario)
    }

    /// Parse and validate scenario TOML
    pub fn parse(content: &str) -> Result<Self> {
        let scenario: Scenario = toml::from_str(content).context("Failed to parse scenario TOML")?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Check handler references and per-action parameters
    pub fn validate(&self) -> Result<()> {
        let mut declared = HashSet::new();
        for entry in &self.handlers {
            if entry.name.trim().is_empty() {
                anyhow::bail!("Handler names must not be empty");
            }
            if !declared.insert(entry.name.as_str()) {
                anyhow::bail!("Duplicate handler name '{}'", entry.name);
            }
        }

        let mut known = declared.clone();
        for entry in &self.handlers {
            let needs_target = matches!(
                entry.action,
                HandlerAction::Subscribe | HandlerAction::Unsubscribe | HandlerAction::Publish
            );
            if needs_target && entry.target().trim().is_empty() {
                anyhow::bail!("Handler '{}' ({:?}) requires a target", entry.name, entry.action);
            }
            if entry.action == HandlerAction::Subscribe {
                if declared.contains(entry.target()) {
                    anyhow::bail!("Handler '{}' would subscribe '{}', which is already declared",
                                  entry.name, entry.target());
                }
                known.insert(entry.target());
            }
        }

        for entry in &self.handlers {
            if entry.action == HandlerAction::Unsubscribe && !known.contains(entry.target()) {
                anyhow::bail!("Handler '{}' unsubscribes unknown handler '{}'", entry.name, entry.target());
            }
        }

        for (index, step) in self.steps.iter().enumerate() {
            if let Step::Unsubscribe { handler } = step {
                if !known.contains(handler.as_str()) {
                    anyhow::bail!("Step {} unsubscribes unknown handler '{}'", index + 1, handler);
                }
            }
        }

        Ok(())
    }
}

/// Reports produced by one publish step
#[derive(Debug, Clone)]
pub struct PublishRecord {
    /// Zero-based index of the step
    pub step: usize,
    pub report: DispatchReport,
    /// Reports of publishes made by handlers during this step, innermost first
    pub nested: Vec<DispatchReport>,
}

/// Everything a scenario run produced
#[derive(Debug, Clone)]
pub struct ScenarioOutcome {
    pub publishes: Vec<PublishRecord>,
    pub log: Vec<String>,
    pub stats: DeliveryStats,
}

/// Deepest chain of handler-initiated publishes a run allows
pub const MAX_PUBLISH_DEPTH: usize = 16;

/// State shared between the runner and every scenario handler
#[derive(Default)]
struct ScenarioState {
    log: Mutex<Vec<String>>,
    tokens: Mutex<HashMap<String, Vec<SubscriptionToken>>>,
    nested: Mutex<Vec<DispatchReport>>,
    publish_depth: AtomicUsize,
}

/// Holds one level of nested publish until dropped
struct PublishDepth<'a>(&'a AtomicUsize);

impl Drop for PublishDepth<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScenarioState {
    fn enter_publish(&self) -> Result<PublishDepth<'_>, HandlerFailure> {
        let depth = self.publish_depth.fetch_add(1, Ordering::SeqCst);
        if depth >= MAX_PUBLISH_DEPTH {
            self.publish_depth.fetch_sub(1, Ordering::SeqCst);
            return Err(HandlerFailure::failed("publish depth exceeded"));
        }
        Ok(PublishDepth(&self.publish_depth))
    }

    fn record(&self, name: &str, payload: &str) {
        self.log.lock().push(format!("{}:{}", name, payload));
    }

    fn remember(&self, name: &str, token: SubscriptionToken) {
        self.tokens.lock().entry(name.to_string()).or_default().push(token);
    }

    fn forget(&self, name: &str) -> Vec<SubscriptionToken> {
        self.tokens.lock().remove(name).unwrap_or_default()
    }

    fn push_nested(&self, report: DispatchReport) {
        self.nested.lock().push(report);
    }

    fn take_nested(&self) -> Vec<DispatchReport> {
        std::mem::take(&mut *self.nested.lock())
    }

    fn take_log(&self) -> Vec<String> {
        std::mem::take(&mut *self.log.lock())
    }
}

/// Handler executing a [`HandlerEntry`] against hub `H`
struct ScenarioHandler<H> {
    entry: HandlerEntry,
    state: Arc<ScenarioState>,
    hub: H,
}

impl<H: Clone> ScenarioHandler<H> {
    /// Handle the actions that never touch the hub; `None` means the caller
    /// must carry out a hub action
    fn run_local(&self, payload: &str) -> Option<HandlerResult> {
        match self.entry.action {
            HandlerAction::Fail => Some(Err(HandlerFailure::failed(self.entry.failure_message("failed")))),
            HandlerAction::Panic => panic!("{}", self.entry.failure_message("panicked")),
            HandlerAction::Record => {
                self.state.record(&self.entry.name, payload);
                Some(Ok(()))
            }
            HandlerAction::Subscribe | HandlerAction::Unsubscribe | HandlerAction::Publish => {
                self.state.record(&self.entry.name, payload);
                None
            }
        }
    }

    fn spawn_recorder(&self) -> Self {
        Self {
            entry: HandlerEntry {
                name: self.entry.target().to_string(),
                kind: self.entry.kind.clone(),
                action: HandlerAction::Record,
                once: false,
                message: None,
                target: None,
                payload: None,
            },
            state: Arc::clone(&self.state),
            hub: self.hub.clone(),
        }
    }

    fn nested_payload(&self, received: &str) -> String {
        self.entry.payload.clone().unwrap_or_else(|| received.to_string())
    }
}

impl Handler<String> for ScenarioHandler<NotificationHub<String>> {
    fn handle(&self, payload: &String) -> HandlerResult {
        if let Some(result) = self.run_local(payload) {
            return result;
        }
        match self.entry.action {
            HandlerAction::Subscribe => {
                let token = self.hub.subscribe(self.entry.kind.clone(), Arc::new(self.spawn_recorder()));
                self.state.remember(self.entry.target(), token);
            }
            HandlerAction::Unsubscribe => {
                for token in self.state.forget(self.entry.target()) {
                    self.hub.unsubscribe(&token);
                }
            }
            HandlerAction::Publish => {
                let _depth = self.state.enter_publish()?;
                let report = self.hub.publish(self.entry.target(), &self.nested_payload(payload));
                self.state.push_nested(report);
            }
            HandlerAction::Record | HandlerAction::Fail | HandlerAction::Panic => {}
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.entry.name
    }
}

#[async_trait::async_trait]
impl AsyncHandler<String> for ScenarioHandler<AsyncNotificationHub<String>> {
    async fn handle(&self, payload: &String) -> HandlerResult {
        if let Some(result) = self.run_local(payload) {
            return result;
        }
        match self.entry.action {
            HandlerAction::Subscribe => {
                let token = self.hub.subscribe(self.entry.kind.clone(), Arc::new(self.spawn_recorder())).await;
                self.state.remember(self.entry.target(), token);
            }
            HandlerAction::Unsubscribe => {
                for token in self.state.forget(self.entry.target()) {
                    self.hub.unsubscribe(&token).await;
                }
            }
            HandlerAction::Publish => {
                let _depth = self.state.enter_publish()?;
                let nested_payload = self.nested_payload(payload);
                let report = self.hub.publish(self.entry.target(), &nested_payload).await;
                self.state.push_nested(report);
            }
            HandlerAction::Record | HandlerAction::Fail | HandlerAction::Panic => {}
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.entry.name
    }
}

/// Runs a scenario against a fresh hub
pub struct ScenarioRunner {
    scenario: Scenario,
}

impl ScenarioRunner {
    pub fn new(scenario: Scenario) -> Self {
        Self { scenario }
    }

    /// Run with the synchronous hub
    pub fn run(&self) -> ScenarioOutcome {
        let hub: NotificationHub<String> = NotificationHub::new();
        let state = Arc::new(ScenarioState::default());

        for entry in &self.scenario.handlers {
            let handler = Arc::new(ScenarioHandler {
                entry: entry.clone(),
                state: Arc::clone(&state),
                hub: hub.clone(),
            });
            let token = if entry.once {
                hub.subscribe_once(entry.kind.clone(), handler)
            } else {
                hub.subscribe(entry.kind.clone(), handler)
            };
            state.remember(&entry.name, token);
        }

        let mut publishes = Vec::new();
        for (index, step) in self.scenario.steps.iter().enumerate() {
            debug!("Running step {}: {:?}", index + 1, step);
            match step {
                Step::Publish { kind, payload } => {
                    let report = hub.publish(kind.clone(), payload);
                    publishes.push(PublishRecord { step: index, report, nested: state.take_nested() });
                }
                Step::Unsubscribe { handler } => {
                    for token in state.forget(handler) {
                        hub.unsubscribe(&token);
                    }
                }
                Step::Clear { kind } => hub.clear(kind.clone()),
            }
        }

        let stats = hub.stats();
        // Handlers hold clones of the hub
        hub.clear(None);
        ScenarioOutcome { publishes, log: state.take_log(), stats }
    }

    /// Run with the asynchronous hub
    pub async fn run_async(&self) -> ScenarioOutcome {
        let hub: AsyncNotificationHub<String> = AsyncNotificationHub::new();
        let state = Arc::new(ScenarioState::default());

        for entry in &self.scenario.handlers {
            let handler = Arc::new(ScenarioHandler {
                entry: entry.clone(),
                state: Arc::clone(&state),
                hub: hub.clone(),
            });
            let token = if entry.once {
                hub.subscribe_once(entry.kind.clone(), handler).await
            } else {
                hub.subscribe(entry.kind.clone(), handler).await
            };
            state.remember(&entry.name, token);
        }

        let mut publishes = Vec::new();
        for (index, step) in self.scenario.steps.iter().enumerate() {
            debug!("Running step {}: {:?}", index + 1, step);
            match step {
                Step::Publish { kind, payload } => {
                    let report = hub.publish(kind.clone(), payload).await;
                    publishes.push(PublishRecord { step: index, report, nested: state.take_nested() });
                }
                Step::Unsubscribe { handler } => {
                    for token in state.forget(handler) {
                        hub.unsubscribe(&token).await;
                    }
                }
                Step::Clear { kind } => hub.clear(kind.clone()).await,
            }
        }

        let stats = hub.stats();
        hub.clear(None).await;
        ScenarioOutcome { publishes, log: state.take_log(), stats }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::DispatchStatus;

    const BASIC: &str = r#"
[[handler]]
name = "A"
kind = "x"
action = "record"

[[handler]]
name = "B"
kind = "x"
action = "fail"
message = "B is broken"

[[step]]
op = "publish"
kind = "x"
payload = "hello"
"#;

    #[test]
    fn test_parse_basic_scenario() {
        let scenario = Scenario::parse(BASIC).unwrap();
        assert_eq!(scenario.handlers.len(), 2);
        assert_eq!(scenario.handlers[1].action, HandlerAction::Fail);
        assert!(!scenario.handlers[0].once);
        assert_eq!(
            scenario.steps,
            vec![Step::Publish { kind: EventKind::from("x"), payload: "hello".to_string() }]
        );
    }

    #[test]
    fn test_record_then_fail() {
        let outcome = ScenarioRunner::new(Scenario::parse(BASIC).unwrap()).run();

        assert_eq!(outcome.log, vec!["A:hello"]);
        assert_eq!(outcome.publishes.len(), 1);
        let report = &outcome.publishes[0].report;
        assert_eq!(report.outcomes()[0].status, DispatchStatus::Succeeded);
        assert_eq!(
            report.outcomes()[1].status,
            DispatchStatus::Failed(HandlerFailure::failed("B is broken"))
        );
        assert_eq!(outcome.stats.handler_failures, 1);
    }

    #[test]
    fn test_validation_errors() {
        let duplicate = r#"
[[handler]]
name = "A"
kind = "x"
action = "record"
[[handler]]
name = "A"
kind = "y"
action = "record"
"#;
        assert!(Scenario::parse(duplicate).is_err());

        let missing_target = "[[handler]]\nname = \"A\"\nkind = \"x\"\naction = \"publish\"\n";
        assert!(Scenario::parse(missing_target).is_err());

        let unknown_step = "[[step]]\nop = \"unsubscribe\"\nhandler = \"ghost\"\n";
        assert!(Scenario::parse(unknown_step).is_err());

        let empty_kind = "[[handler]]\nname = \"A\"\nkind = \"  \"\naction = \"record\"\n";
        assert!(Scenario::parse(empty_kind).is_err());

        let unknown_action = "[[handler]]\nname = \"A\"\nkind = \"x\"\naction = \"teleport\"\n";
        assert!(Scenario::parse(unknown_action).is_err());

        let unknown_field = "[[handler]]\nname = \"A\"\nkind = \"x\"\naction = \"record\"\ncolour = \"red\"\n";
        assert!(Scenario::parse(unknown_field).is_err());
    }

    const REENTRANT: &str = r#"
[[handler]]
name = "spawner"
kind = "x"
action = "subscribe"
target = "late"

[[handler]]
name = "relay"
kind = "x"
action = "publish"
target = "y"
payload = "relayed"

[[handler]]
name = "listener"
kind = "y"
action = "record"

[[step]]
op = "publish"
kind = "x"
payload = "1"

[[step]]
op = "publish"
kind = "x"
payload = "2"

[[step]]
op = "unsubscribe"
handler = "late"

[[step]]
op = "publish"
kind = "x"
payload = "3"

[[step]]
op = "clear"

[[step]]
op = "publish"
kind = "x"
payload = "4"
"#;

    fn assert_reentrant_outcome(outcome: &ScenarioOutcome) {
        assert_eq!(outcome.log, vec![
            "spawner:1", "relay:1", "listener:relayed",
            "spawner:2", "relay:2", "listener:relayed", "late:2",
            "spawner:3", "relay:3", "listener:relayed",
        ]);

        let sizes: Vec<usize> = outcome.publishes.iter().map(|p| p.report.len()).collect();
        assert_eq!(sizes, vec![2, 3, 2, 0]);
        assert_eq!(outcome.publishes[0].nested.len(), 1);
        assert_eq!(outcome.publishes[0].nested[0].kind().as_str(), "y");
        assert_eq!(outcome.publishes[3].step, 5);
        assert!(outcome.publishes[3].nested.is_empty());
    }

    #[test]
    fn test_reentrant_actions_sync() {
        let outcome = ScenarioRunner::new(Scenario::parse(REENTRANT).unwrap()).run();
        assert_reentrant_outcome(&outcome);
    }

    #[tokio::test]
    async fn test_reentrant_actions_async() {
        let outcome = ScenarioRunner::new(Scenario::parse(REENTRANT).unwrap()).run_async().await;
        assert_reentrant_outcome(&outcome);
    }

    #[test]
    fn test_once_and_panic() {
        let content = r#"
[[handler]]
name = "boom"
kind = "x"
action = "panic"
once = true

[[handler]]
name = "after"
kind = "x"
action = "record"

[[step]]
op = "publish"
kind = "x"
payload = "1"

[[step]]
op = "publish"
kind = "x"
payload = "2"
"#;
        let outcome = ScenarioRunner::new(Scenario::parse(content).unwrap()).run();

        assert_eq!(outcome.log, vec!["after:1", "after:2"]);
        let first = &outcome.publishes[0].report;
        assert_eq!(first.panic_count(), 1);
        assert_eq!(first.outcomes()[0].failure().unwrap().message(), "boom panicked");
        assert_eq!(outcome.publishes[1].report.len(), 1);
        assert_eq!(outcome.stats.handler_panics, 1);
    }

    #[test]
    fn test_unsubscribe_action_during_dispatch() {
        let content = r#"
[[handler]]
name = "janitor"
kind = "x"
action = "unsubscribe"
target = "victim"

[[handler]]
name = "victim"
kind = "x"
action = "record"

[[step]]
op = "publish"
kind = "x"
payload = "1"

[[step]]
op = "publish"
kind = "x"
payload = "2"
"#;
        let outcome = ScenarioRunner::new(Scenario::parse(content).unwrap()).run();
        assert_eq!(outcome.log, vec!["janitor:1", "victim:1", "janitor:2"]);
    }

    const SELF_PUBLISH: &str = r#"
[[handler]]
name = "echo"
kind = "x"
action = "publish"
target = "x"

[[step]]
op = "publish"
kind = "x"
payload = "ping"
"#;

    fn assert_publish_depth_bounded(outcome: &ScenarioOutcome) {
        assert_eq!(outcome.log.len(), MAX_PUBLISH_DEPTH + 1);
        assert!(outcome.log.iter().all(|line| line == "echo:ping"));

        let step = &outcome.publishes[0];
        assert!(step.report.all_succeeded());
        assert_eq!(step.nested.len(), MAX_PUBLISH_DEPTH);
        let innermost = &step.nested[0];
        assert_eq!(innermost.failure_count(), 1);
        assert_eq!(innermost.outcomes()[0].failure().unwrap().message(), "publish depth exceeded");
        assert!(step.nested[1..].iter().all(|report| report.all_succeeded()));
    }

    #[test]
    fn test_self_publish_is_depth_limited() {
        let outcome = ScenarioRunner::new(Scenario::parse(SELF_PUBLISH).unwrap()).run();
        assert_publish_depth_bounded(&outcome);

        // depth is released once the chain unwinds
        let again = ScenarioRunner::new(Scenario::parse(SELF_PUBLISH).unwrap()).run();
        assert_eq!(again.log.len(), MAX_PUBLISH_DEPTH + 1);
    }

    #[tokio::test]
    async fn test_self_publish_is_depth_limited_async() {
        let outcome = ScenarioRunner::new(Scenario::parse(SELF_PUBLISH).unwrap()).run_async().await;
        assert_publish_depth_bounded(&outcome);
    }

    #[test]
    fn test_publish_depth_resets_between_steps() {
        let content = format!("{}\n[[step]]\nop = \"publish\"\nkind = \"x\"\npayload = \"ping\"\n", SELF_PUBLISH);
        let outcome = ScenarioRunner::new(Scenario::parse(&content).unwrap()).run();
        assert_eq!(outcome.log.len(), 2 * (MAX_PUBLISH_DEPTH + 1));
        assert_eq!(outcome.publishes[1].nested.len(), MAX_PUBLISH_DEPTH);
    }

    #[test]
    fn test_load_missing_file() {
        let error = Scenario::load(Path::new("/nonexistent/scenario.toml")).unwrap_err();
        assert!(error.to_string().contains("Failed to read scenario file"));
    }
}
