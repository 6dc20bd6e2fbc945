//! Dispatch Reports
//!
//! The result of a single `publish` call: one outcome per handler invoked,
//! in the order the handlers were invoked.

use serde::Serialize;

use crate::notifications::error::HandlerFailure;
use crate::notifications::events::{EventKind, SubscriptionToken};

/// Final state of one handler invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum DispatchStatus {
    Succeeded,
    Failed(HandlerFailure),
}

/// Outcome of invoking one handler
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandlerOutcome<K = EventKind> {
    /// Position of the handler within the dispatch snapshot
    pub index: usize,
    pub token: SubscriptionToken<K>,
    /// Handler display name
    pub handler: String,
    #[serde(flatten)]
    pub status: DispatchStatus,
}

impl<K> HandlerOutcome<K> {
    pub fn is_success(&self) -> bool {
        matches!(self.status, DispatchStatus::Succeeded)
    }

    pub fn failure(&self) -> Option<&HandlerFailure> {
        match &self.status {
            DispatchStatus::Succeeded => None,
            DispatchStatus::Failed(failure) => Some(failure),
        }
    }
}

/// Per-handler results of one `publish` call
///
/// An empty report means no handler was registered for the kind; it is not
/// an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchReport<K = EventKind> {
    kind: K,
    outcomes: Vec<HandlerOutcome<K>>,
}

impl<K> DispatchReport<K> {
    pub(crate) fn with_capacity(kind: K, capacity: usize) -> Self {
        Self { kind, outcomes: Vec::with_capacity(capacity) }
    }

    pub(crate) fn push(&mut self, outcome: HandlerOutcome<K>) {
        self.outcomes.push(outcome);
    }

    /// The kind that was published
    pub fn kind(&self) -> &K {
        &self.kind
    }

    pub fn outcomes(&self) -> &[HandlerOutcome<K>] {
        &self.outcomes
    }

    pub fn iter(&self) -> std::slice::Iter<'_, HandlerOutcome<K>> {
        self.outcomes.iter()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn successes(&self) -> impl Iterator<Item = &HandlerOutcome<K>> {
        self.outcomes.iter().filter(|o| o.is_success())
    }

    pub fn failures(&self) -> impl Iterator<Item = &HandlerOutcome<K>> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    pub fn success_count(&self) -> usize {
        self.successes().count()
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }

    pub fn panic_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.failure().is_some_and(HandlerFailure::is_panic))
            .count()
    }

    /// True when every invoked handler succeeded, including when none ran
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(HandlerOutcome::is_success)
    }

    pub fn into_outcomes(self) -> Vec<HandlerOutcome<K>> {
        self.outcomes
    }
}

impl<'a, K> IntoIterator for &'a DispatchReport<K> {
    type Item = &'a HandlerOutcome<K>;
    type IntoIter = std::slice::Iter<'a, HandlerOutcome<K>>;

    fn into_iter(self) -> Self::IntoIter {
        self.outcomes.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::events::SubscriptionId;

    fn outcome(index: usize, handler: &str, status: DispatchStatus) -> HandlerOutcome {
        HandlerOutcome {
            index,
            token: SubscriptionToken::new(SubscriptionId::new(index as u64 + 1), EventKind::from("x")),
            handler: handler.to_string(),
            status,
        }
    }

    fn sample_report() -> DispatchReport {
        let mut report = DispatchReport::with_capacity(EventKind::from("x"), 3);
        report.push(outcome(0, "A", DispatchStatus::Succeeded));
        report.push(outcome(1, "B", DispatchStatus::Failed(HandlerFailure::failed("boom"))));
        report.push(outcome(2, "C", DispatchStatus::Failed(HandlerFailure::panicked("oops"))));
        report
    }

    #[test]
    fn test_report_counts() {
        let report = sample_report();
        assert_eq!(report.len(), 3);
        assert_eq!(report.success_count(), 1);
        assert_eq!(report.failure_count(), 2);
        assert_eq!(report.panic_count(), 1);
        assert!(!report.all_succeeded());

        let failed: Vec<&str> = report.failures().map(|o| o.handler.as_str()).collect();
        assert_eq!(failed, vec!["B", "C"]);
    }

    #[test]
    fn test_empty_report_is_success() {
        let report: DispatchReport = DispatchReport::with_capacity(EventKind::from("nobody"), 0);
        assert!(report.is_empty());
        assert!(report.all_succeeded());
        assert_eq!(report.kind().as_str(), "nobody");
    }

    #[test]
    fn test_report_serialization() {
        let json = serde_json::to_value(sample_report()).unwrap();
        assert_eq!(json["kind"], "x");
        assert_eq!(json["outcomes"][0]["handler"], "A");
        assert_eq!(json["outcomes"][0]["status"], "succeeded");
        assert_eq!(json["outcomes"][0]["token"]["id"], 1);
        assert_eq!(json["outcomes"][1]["status"], "failed");
        assert_eq!(json["outcomes"][1]["error"]["type"], "failed");
        assert_eq!(json["outcomes"][1]["error"]["message"], "boom");
        assert_eq!(json["outcomes"][2]["error"]["type"], "panicked");
    }
}
