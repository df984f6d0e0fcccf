//! Accumulates stream outcomes for the end-of-run summary.

use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Terminal classification of a stream.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StreamOutcome {
    /// Latest execution finished with `SUCCESS`.
    Succeeded,
    /// Latest execution finished with `ERROR`.
    Failed,
    /// The task went idle but its latest execution could not be classified.
    Unknown,
}

impl fmt::Display for StreamOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => f.write_str("succeeded"),
            Self::Failed => f.write_str("failed"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// A stop request that did not go through.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TeardownFailure {
    /// Stream whose resource should have been stopped.
    pub stream: String,
    /// Provider error message.
    pub message: String,
}

/// Ordered record of stream outcomes plus run timestamps.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunReport {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    outcomes: Vec<(String, StreamOutcome)>,
    teardown_failures: Vec<TeardownFailure>,
}

impl RunReport {
    /// Starts a report for a run that began at `started_at`.
    #[must_use]
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at,
            finished_at: None,
            outcomes: Vec::new(),
            teardown_failures: Vec::new(),
        }
    }

    /// Identifier used to correlate log lines and notifications.
    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Time at which the run started.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Time at which the run finished, once [`RunReport::finish`] was called.
    #[must_use]
    pub const fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Appends the outcome for `stream`.
    pub fn record(&mut self, stream: impl Into<String>, outcome: StreamOutcome) {
        self.outcomes.push((stream.into(), outcome));
    }

    /// Notes that stopping the resource of `stream` failed.
    pub fn record_teardown_failure(&mut self, stream: impl Into<String>, message: impl Into<String>) {
        self.teardown_failures.push(TeardownFailure {
            stream: stream.into(),
            message: message.into(),
        });
    }

    /// Marks the report as final.
    pub fn finish(&mut self, finished_at: DateTime<Utc>) {
        self.finished_at = Some(finished_at);
    }

    /// All recorded outcomes in observation order.
    #[must_use]
    pub fn outcomes(&self) -> &[(String, StreamOutcome)] {
        &self.outcomes
    }

    /// Teardown failures in observation order.
    #[must_use]
    pub fn teardown_failures(&self) -> &[TeardownFailure] {
        &self.teardown_failures
    }

    /// Names of streams with the given outcome, in observation order.
    #[must_use]
    pub fn streams_with(&self, outcome: StreamOutcome) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, recorded)| *recorded == outcome)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Names of failed streams.
    #[must_use]
    pub fn failed(&self) -> Vec<&str> {
        self.streams_with(StreamOutcome::Failed)
    }

    /// Names of succeeded streams.
    #[must_use]
    pub fn succeeded(&self) -> Vec<&str> {
        self.streams_with(StreamOutcome::Succeeded)
    }

    /// Returns `true` when every recorded stream succeeded.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.outcomes
            .iter()
            .all(|(_, outcome)| *outcome == StreamOutcome::Succeeded)
    }

    /// Renders the human readable summary posted at the end of a run.
    #[must_use]
    pub fn render_summary(&self) -> String {
        let mut lines = vec![
            String::from("Finished, execution results:"),
            format!("Task failed: {}", render_list(&self.failed())),
            format!("Task success: {}", render_list(&self.succeeded())),
        ];

        let unknown = self.streams_with(StreamOutcome::Unknown);
        if !unknown.is_empty() {
            lines.push(format!("Task outcome unknown: {}", render_list(&unknown)));
        }

        if !self.teardown_failures.is_empty() {
            let failures = self
                .teardown_failures
                .iter()
                .map(|failure| format!("{} ({})", failure.stream, failure.message))
                .collect::<Vec<_>>();
            let names = failures.iter().map(String::as_str).collect::<Vec<_>>();
            lines.push(format!("Teardown failed: {}", render_list(&names)));
        }

        lines.push(format!(
            "Started at: {}",
            self.started_at.format(TIMESTAMP_FORMAT)
        ));
        let finished = self.finished_at.map_or_else(
            || String::from("-"),
            |at| at.format(TIMESTAMP_FORMAT).to_string(),
        );
        lines.push(format!("Finished at: {finished}"));
        lines.push(format!("Run id: {}", self.run_id));
        lines.join("\n")
    }
}

fn render_list(items: &[&str]) -> String {
    format!("[{}]", items.join(", "))
}
