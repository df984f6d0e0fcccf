//! Polls stream status, classifies finished streams, and stops their VMs.
//!
//! Each configured stream is tracked in an ordered table. A stream stays
//! [`StreamPhase::Pending`] while its task is in progress. Any other status
//! except `UNAVAILABLE` ends the stream, an unrecognised one included: the
//! latest execution decides the outcome, the outcome is recorded, the
//! stream's compute resource is stopped, and the stream becomes
//! [`StreamPhase::Terminal`]. A task missing from the listing keeps its
//! stream pending. Terminal streams are never evaluated again, so a
//! resource is stopped at most once.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::compute::ComputeProvider;
use crate::manifest::StreamSpec;
use crate::provisioner::{ResourceIndex, ResourceProvisioner};
use crate::report::{RunReport, StreamOutcome};
use crate::transfer::{ExecutionStatus, TaskStatus, TaskSummary, TransferService};

/// Default delay between two status polls.
pub const DEFAULT_STREAM_POLL_INTERVAL: Duration = Duration::from_secs(300);

/// Default number of tasks requested per poll.
pub const DEFAULT_TASK_LIST_LIMIT: u32 = 100;

/// Lifecycle phase of a tracked stream.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StreamPhase {
    /// Transfer not yet finished.
    Pending,
    /// Outcome recorded and resource stop requested.
    Terminal(StreamOutcome),
}

#[derive(Clone, Debug)]
struct TrackedStream {
    name: String,
    phase: StreamPhase,
}

/// Status poller driving per-stream teardown.
#[derive(Debug)]
pub struct StreamMonitor<'a, P, T> {
    provisioner: ResourceProvisioner<'a, P>,
    transfer: &'a T,
    index: &'a ResourceIndex,
    tracked: Vec<TrackedStream>,
    poll_interval: Duration,
    task_list_limit: u32,
}

impl<'a, P, T> StreamMonitor<'a, P, T>
where
    P: ComputeProvider,
    T: TransferService,
{
    /// Tracks `streams`, all initially pending.
    #[must_use]
    pub fn new(
        provider: &'a P,
        transfer: &'a T,
        index: &'a ResourceIndex,
        streams: &[StreamSpec],
    ) -> Self {
        Self {
            provisioner: ResourceProvisioner::new(provider),
            transfer,
            index,
            tracked: streams
                .iter()
                .map(|stream| TrackedStream {
                    name: stream.name.clone(),
                    phase: StreamPhase::Pending,
                })
                .collect(),
            poll_interval: DEFAULT_STREAM_POLL_INTERVAL,
            task_list_limit: DEFAULT_TASK_LIST_LIMIT,
        }
    }

    /// Overrides the delay between polls.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Overrides the number of tasks requested per poll.
    #[must_use]
    pub const fn with_task_list_limit(mut self, limit: u32) -> Self {
        self.task_list_limit = limit;
        self
    }

    /// Current phase of `stream`, or `None` for an untracked name.
    #[must_use]
    pub fn phase(&self, stream: &str) -> Option<StreamPhase> {
        self.tracked
            .iter()
            .find(|tracked| tracked.name == stream)
            .map(|tracked| tracked.phase)
    }

    /// Returns `true` once every tracked stream is terminal.
    #[must_use]
    pub fn all_terminal(&self) -> bool {
        self.tracked
            .iter()
            .all(|tracked| matches!(tracked.phase, StreamPhase::Terminal(_)))
    }

    /// Polls until every stream is terminal and returns the number of polls.
    ///
    /// The first poll happens immediately and there is no sleep after the
    /// last one.
    ///
    /// # Errors
    ///
    /// Returns the transfer service error from a failed task listing or
    /// execution query.
    pub async fn run(&mut self, report: &mut RunReport) -> Result<u32, T::Error> {
        let mut polls = 0_u32;
        loop {
            self.poll_once(report).await?;
            polls = polls.saturating_add(1);
            if self.all_terminal() {
                info!(polls, "all streams finished");
                return Ok(polls);
            }
            debug!(interval = ?self.poll_interval, "waiting before next status poll");
            sleep(self.poll_interval).await;
        }
    }

    /// Lists tasks once and evaluates every pending stream.
    ///
    /// # Errors
    ///
    /// Returns the transfer service error from a failed task listing or
    /// execution query.
    pub async fn poll_once(&mut self, report: &mut RunReport) -> Result<(), T::Error> {
        let tasks = self.transfer.list_tasks(self.task_list_limit).await?;

        for position in 0..self.tracked.len() {
            let Some(tracked) = self.tracked.get(position) else {
                continue;
            };
            if tracked.phase != StreamPhase::Pending {
                continue;
            }
            let name = tracked.name.clone();

            let Some(task) = tasks.iter().find(|task| task.name == name) else {
                warn!(stream = %name, "stream task missing from listing");
                continue;
            };

            let outcome = self.evaluate(&name, task, report).await?;
            if let (Some(outcome), Some(entry)) = (outcome, self.tracked.get_mut(position)) {
                entry.phase = StreamPhase::Terminal(outcome);
            }
        }
        Ok(())
    }

    async fn evaluate(
        &self,
        stream: &str,
        task: &TaskSummary,
        report: &mut RunReport,
    ) -> Result<Option<StreamOutcome>, T::Error> {
        match &task.status {
            status if status.is_in_progress() => {
                debug!(stream, status = %status, "stream in progress");
                Ok(None)
            }
            TaskStatus::Available | TaskStatus::Other(_) => {
                if let TaskStatus::Other(raw) = &task.status {
                    warn!(stream, status = %raw, "unrecognised task status; treating as finished");
                }
                let outcome = self.resolve_outcome(&task.task_arn).await?;
                info!(stream, outcome = %outcome, "stream finished");
                report.record(stream, outcome);
                self.teardown(stream, report).await;
                Ok(Some(outcome))
            }
            _ => {
                debug!(stream, "stream task unavailable; ignoring");
                Ok(None)
            }
        }
    }

    async fn resolve_outcome(&self, task_arn: &str) -> Result<StreamOutcome, T::Error> {
        let executions = self.transfer.list_task_executions(task_arn, 1).await?;
        let outcome = match executions.first().map(|execution| &execution.status) {
            Some(ExecutionStatus::Success) => StreamOutcome::Succeeded,
            Some(ExecutionStatus::Error) => StreamOutcome::Failed,
            Some(ExecutionStatus::InProgress(status)) => {
                warn!(task = task_arn, status = %status, "latest execution not finished");
                StreamOutcome::Unknown
            }
            None => {
                warn!(task = task_arn, "task has no executions");
                StreamOutcome::Unknown
            }
        };
        Ok(outcome)
    }

    async fn teardown(&self, stream: &str, report: &mut RunReport) {
        let Some(resource) = self.index.resource_for(stream) else {
            warn!(stream, "no compute resource mapped to stream");
            report.record_teardown_failure(stream, "no compute resource mapped");
            return;
        };

        if let Err(err) = self.provisioner.stop(resource).await {
            warn!(stream, resource = %resource.name, error = %err, "failed to stop resource");
            report.record_teardown_failure(stream, err.to_string());
        }
    }
}

#[cfg(test)]
mod tests;
