//! Orchestrates a complete migration run.
//!
//! The pipeline powers on the sync agent VMs, maps each stream to its VM,
//! waits for every sync agent to report online, starts one transfer per
//! stream, and polls until all streams are terminal, stopping each VM as
//! its stream finishes. The first stage failure aborts the run and is
//! reported once through the notifier; a completed run posts a summary.

use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::compute::{ComputeProvider, ResourceSelector};
use crate::health::AgentHealthGate;
use crate::launcher::{LaunchError, TransferLauncher};
use crate::manifest::StreamManifest;
use crate::monitor::{DEFAULT_STREAM_POLL_INTERVAL, DEFAULT_TASK_LIST_LIMIT, StreamMonitor};
use crate::notify::Notifier;
use crate::provisioner::{ResourceIndex, ResourceIndexError, ResourceProvisioner};
use crate::report::RunReport;
use crate::transfer::TransferService;

const AGENT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Prefix of every failure notification.
pub const FAILURE_PREFIX: &str = "[MIGRATION PIPELINE] Warning";

/// Errors that abort a migration run.
#[derive(Debug, Error)]
pub enum PipelineError<ProviderError, TransferError>
where
    ProviderError: std::error::Error + 'static,
    TransferError: std::error::Error + 'static,
{
    /// Raised when compute resources cannot be listed or powered on.
    #[error("failed to provision compute resources: {0}")]
    Provision(#[source] ProviderError),
    /// Raised when streams cannot be mapped onto compute resources.
    #[error("failed to map streams to compute resources: {0}")]
    ResourceMapping(#[source] ResourceIndexError),
    /// Raised when the sync agent roster cannot be listed.
    #[error("failed to check sync agent health: {0}")]
    AgentHealth(#[source] TransferError),
    /// Raised when a transfer cannot be started.
    #[error("failed to launch transfers: {0}")]
    Launch(#[source] LaunchError<TransferError>),
    /// Raised when stream status cannot be polled.
    #[error("failed to poll stream status: {0}")]
    Poll(#[source] TransferError),
}

impl<ProviderError, TransferError> PipelineError<ProviderError, TransferError>
where
    ProviderError: std::error::Error + 'static,
    TransferError: std::error::Error + 'static,
{
    /// Streams that were already started when the run aborted.
    #[must_use]
    pub fn started_streams(&self) -> &[String] {
        match self {
            Self::Launch(err) => &err.started,
            _ => &[],
        }
    }
}

/// Formats the failure notification for `detail`.
#[must_use]
pub fn failure_message(detail: &str, diagnostics_url: Option<&str>) -> String {
    let mut message = format!("{FAILURE_PREFIX} - {detail}");
    if let Some(url) = diagnostics_url {
        message.push_str(", get more info on: ");
        message.push_str(url);
    }
    message
}

/// Runs the migration flow over the provided adapters.
#[derive(Debug)]
pub struct MigrationPipeline<P, T, N> {
    provider: P,
    transfer: T,
    notifier: N,
    selector: ResourceSelector,
    agent_poll_interval: Duration,
    stream_poll_interval: Duration,
    task_list_limit: u32,
    diagnostics_url: Option<String>,
}

impl<P, T, N> MigrationPipeline<P, T, N>
where
    P: ComputeProvider,
    T: TransferService,
    N: Notifier,
{
    /// Creates a pipeline for the resources matching `selector`.
    #[must_use]
    pub const fn new(provider: P, transfer: T, notifier: N, selector: ResourceSelector) -> Self {
        Self {
            provider,
            transfer,
            notifier,
            selector,
            agent_poll_interval: AGENT_POLL_INTERVAL,
            stream_poll_interval: DEFAULT_STREAM_POLL_INTERVAL,
            task_list_limit: DEFAULT_TASK_LIST_LIMIT,
            diagnostics_url: None,
        }
    }

    /// Overrides the delay between agent health polls.
    #[must_use]
    pub const fn with_agent_poll_interval(mut self, interval: Duration) -> Self {
        self.agent_poll_interval = interval;
        self
    }

    /// Overrides the delay between stream status polls.
    #[must_use]
    pub const fn with_stream_poll_interval(mut self, interval: Duration) -> Self {
        self.stream_poll_interval = interval;
        self
    }

    /// Overrides the number of tasks requested per status poll.
    #[must_use]
    pub const fn with_task_list_limit(mut self, limit: u32) -> Self {
        self.task_list_limit = limit;
        self
    }

    /// Sets the URL appended to failure notifications.
    #[must_use]
    pub fn with_diagnostics_url(mut self, url: Option<String>) -> Self {
        self.diagnostics_url = url;
        self
    }

    /// Runs every stage and returns the finished report.
    ///
    /// Individual stream failures are part of the report, not errors. A
    /// summary is posted on completion; delivery problems are logged only.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] for the first stage that fails. A failure
    /// notification has already been attempted when this returns.
    pub async fn run(
        &self,
        manifest: &StreamManifest,
    ) -> Result<RunReport, PipelineError<P::Error, T::Error>> {
        let mut report = RunReport::new(Utc::now());
        info!(
            run_id = %report.run_id(),
            streams = manifest.len(),
            "starting migration run"
        );

        match self.execute(manifest, &mut report).await {
            Ok(()) => {
                report.finish(Utc::now());
                info!(
                    run_id = %report.run_id(),
                    failed = report.failed().len(),
                    succeeded = report.succeeded().len(),
                    "migration run finished"
                );
                self.send_summary(&report).await;
                Ok(report)
            }
            Err(err) => {
                error!(run_id = %report.run_id(), error = %err, "migration run aborted");
                self.send_failure(&err).await;
                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        manifest: &StreamManifest,
        report: &mut RunReport,
    ) -> Result<(), PipelineError<P::Error, T::Error>> {
        let resources = ResourceProvisioner::new(&self.provider)
            .ensure_running(&self.selector)
            .await
            .map_err(PipelineError::Provision)?;

        let index = ResourceIndex::build(&resources, manifest.streams())
            .map_err(PipelineError::ResourceMapping)?;

        AgentHealthGate::new(&self.transfer)
            .wait_until_all_online(self.agent_poll_interval)
            .await
            .map_err(PipelineError::AgentHealth)?;

        TransferLauncher::new(&self.transfer)
            .start_all(manifest.streams())
            .await
            .map_err(PipelineError::Launch)?;

        StreamMonitor::new(&self.provider, &self.transfer, &index, manifest.streams())
            .with_poll_interval(self.stream_poll_interval)
            .with_task_list_limit(self.task_list_limit)
            .run(report)
            .await
            .map_err(PipelineError::Poll)?;
        Ok(())
    }

    async fn send_failure(&self, err: &PipelineError<P::Error, T::Error>) {
        let mut detail = err.to_string();
        let started = err.started_streams();
        if !started.is_empty() {
            detail.push_str(" (already started: ");
            detail.push_str(&started.join(", "));
            detail.push(')');
        }
        let message = failure_message(&detail, self.diagnostics_url.as_deref());
        if let Err(notify_err) = self.notifier.notify_failure(&message).await {
            warn!(error = %notify_err, "failed to deliver failure notification");
        }
    }

    async fn send_summary(&self, report: &RunReport) {
        if let Err(notify_err) = self.notifier.notify_summary(report).await {
            warn!(error = %notify_err, "failed to deliver run summary");
        }
    }
}
