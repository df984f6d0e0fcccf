//! Shared fixtures for pipeline BDD scenarios.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use convoy::test_support::{
    RecordingNotifier, ScriptedProvider, ScriptedTransferService, TEST_RESOURCE_TAG, task,
};
use convoy::{
    ExecutionStatus, MigrationPipeline, ResourceSelector, RunReport, StreamManifest, StreamSpec,
};
use rstest::fixture;
use thiserror::Error;

pub const AGENT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const STREAM_POLL_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Clone, Debug)]
pub enum PipelineOutcome {
    Completed(RunReport),
    Aborted(String),
}

/// When and how a stream finishes.
#[derive(Clone, Debug)]
pub struct StreamPlan {
    pub finish_on: u32,
    pub execution: ExecutionStatus,
}

#[derive(Debug, Default)]
struct Recorded {
    streams: Vec<StreamSpec>,
    plans: BTreeMap<String, StreamPlan>,
    diagnostics_url: Option<String>,
    outcome: Option<PipelineOutcome>,
    elapsed: Option<Duration>,
}

#[derive(Clone, Debug, Error)]
pub enum PipelineTestError {
    #[error("failed to build runtime: {0}")]
    Runtime(String),
    #[error("invalid manifest: {0}")]
    Manifest(String),
}

#[derive(Clone, Debug)]
pub struct PipelineContext {
    pub provider: ScriptedProvider,
    pub transfer: ScriptedTransferService,
    pub notifier: RecordingNotifier,
    recorded: Arc<Mutex<Recorded>>,
}

impl PipelineContext {
    fn recorded(&self) -> MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_stream(&self, name: &str) {
        self.recorded().streams.push(StreamSpec::new(
            name,
            task_arn(name),
            resource_label(name),
        ));
    }

    pub fn plan(&self, stream: &str, plan: StreamPlan) {
        self.recorded().plans.insert(stream.to_owned(), plan);
    }

    pub fn set_diagnostics_url(&self, url: &str) {
        self.recorded().diagnostics_url = Some(url.to_owned());
    }

    pub fn outcome(&self) -> Option<PipelineOutcome> {
        self.recorded().outcome.clone()
    }

    pub fn elapsed(&self) -> Option<Duration> {
        self.recorded().elapsed
    }

    /// Queues task listings so each planned stream turns `AVAILABLE` on its
    /// poll and `UNAVAILABLE` afterwards.
    fn script_task_polls(&self) {
        let recorded = self.recorded();
        let last_poll = recorded
            .plans
            .values()
            .map(|plan| plan.finish_on)
            .max()
            .unwrap_or(0);
        for poll in 1..=last_poll {
            let listing = recorded
                .plans
                .iter()
                .map(|(name, plan)| {
                    let status = match poll.cmp(&plan.finish_on) {
                        std::cmp::Ordering::Less => "RUNNING",
                        std::cmp::Ordering::Equal => "AVAILABLE",
                        std::cmp::Ordering::Greater => "UNAVAILABLE",
                    };
                    task(&task_arn(name), name, status)
                })
                .collect();
            self.transfer.push_tasks(listing);
        }
        for (name, plan) in &recorded.plans {
            self.transfer
                .set_execution(&task_arn(name), plan.execution.clone());
        }
    }

    /// Runs the pipeline on a paused clock and stores the outcome.
    pub fn run(&self) -> Result<(), PipelineTestError> {
        self.script_task_polls();
        let (streams, diagnostics_url) = {
            let recorded = self.recorded();
            (recorded.streams.clone(), recorded.diagnostics_url.clone())
        };
        let manifest =
            StreamManifest::new(streams).map_err(|err| PipelineTestError::Manifest(err.to_string()))?;
        let pipeline = MigrationPipeline::new(
            self.provider.clone(),
            self.transfer.clone(),
            self.notifier.clone(),
            ResourceSelector::tagged(TEST_RESOURCE_TAG),
        )
        .with_agent_poll_interval(AGENT_POLL_INTERVAL)
        .with_stream_poll_interval(STREAM_POLL_INTERVAL)
        .with_diagnostics_url(diagnostics_url);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .map_err(|err| PipelineTestError::Runtime(err.to_string()))?;
        let (result, elapsed) = runtime.block_on(async {
            let started = tokio::time::Instant::now();
            let result = pipeline.run(&manifest).await;
            (result, started.elapsed())
        });

        let outcome = match result {
            Ok(report) => PipelineOutcome::Completed(report),
            Err(err) => PipelineOutcome::Aborted(err.to_string()),
        };
        let mut recorded = self.recorded();
        recorded.outcome = Some(outcome);
        recorded.elapsed = Some(elapsed);
        Ok(())
    }
}

pub fn task_arn(stream: &str) -> String {
    format!("arn:aws:datasync:us-west-2:111122223333:task/{stream}")
}

pub fn resource_label(stream: &str) -> String {
    format!("SYNC-{}", stream.to_uppercase())
}

pub fn resource_id(stream: &str) -> String {
    format!("srv-{stream}")
}

#[fixture]
pub fn pipeline_context() -> PipelineContext {
    PipelineContext {
        provider: ScriptedProvider::default(),
        transfer: ScriptedTransferService::new(),
        notifier: RecordingNotifier::new(),
        recorded: Arc::new(Mutex::new(Recorded::default())),
    }
}
