//! BDD step definitions for the migration pipeline.

use std::time::Duration;

use convoy::test_support::{agent, resource};
use convoy::{ExecutionStatus, PowerState};
use rstest_bdd_macros::{given, then, when};

use super::test_helpers::{
    PipelineContext, PipelineOutcome, PipelineTestError, StreamPlan, resource_id, resource_label,
};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Setup(#[from] PipelineTestError),
    #[error("assertion failed: {0}")]
    Assertion(String),
}

fn completed(pipeline_context: &PipelineContext) -> Result<convoy::RunReport, StepError> {
    match pipeline_context.outcome() {
        Some(PipelineOutcome::Completed(report)) => Ok(report),
        Some(PipelineOutcome::Aborted(err)) => Err(StepError::Assertion(format!(
            "run aborted unexpectedly: {err}"
        ))),
        None => Err(StepError::Assertion(String::from("missing outcome"))),
    }
}

#[given("streams \"{first}\" and \"{second}\" with stopped sync VMs")]
fn streams_with_stopped_vms(pipeline_context: &PipelineContext, first: String, second: String) {
    for stream in [first, second] {
        pipeline_context.add_stream(&stream);
        pipeline_context.provider.add_resource(resource(
            &resource_id(&stream),
            &resource_label(&stream),
            PowerState::Stopped,
        ));
    }
}

#[given("all sync agents are online")]
fn agents_online(pipeline_context: &PipelineContext) {
    pipeline_context
        .transfer
        .push_agents(vec![agent("agent-1", true), agent("agent-2", true)]);
}

#[given("one sync agent stays offline for \"{polls}\" polls")]
fn agent_offline_for(pipeline_context: &PipelineContext, polls: u32) {
    for _ in 0..polls {
        pipeline_context
            .transfer
            .push_agents(vec![agent("agent-1", true), agent("agent-2", false)]);
    }
    pipeline_context
        .transfer
        .push_agents(vec![agent("agent-1", true), agent("agent-2", true)]);
}

#[given("stream \"{stream}\" finishes with \"{status}\" on poll \"{poll}\"")]
fn stream_finishes(pipeline_context: &PipelineContext, stream: String, status: String, poll: u32) {
    pipeline_context.plan(
        &stream,
        StreamPlan {
            finish_on: poll,
            execution: ExecutionStatus::from_service(&status),
        },
    );
}

#[given("the compute provider fails to list resources with \"{message}\"")]
fn provider_listing_fails(pipeline_context: &PipelineContext, message: String) {
    pipeline_context.provider.fail_listing(&message);
}

#[given("the diagnostics URL is \"{url}\"")]
fn diagnostics_url(pipeline_context: &PipelineContext, url: String) {
    pipeline_context.set_diagnostics_url(&url);
}

#[when("the migration pipeline runs")]
fn pipeline_runs(pipeline_context: &PipelineContext) -> Result<(), StepError> {
    pipeline_context.run()?;
    Ok(())
}

#[then("the run completes after \"{polls}\" status polls")]
fn run_completes_after(pipeline_context: &PipelineContext, polls: usize) -> Result<(), StepError> {
    completed(pipeline_context)?;
    let actual = pipeline_context.transfer.task_list_calls();
    if actual == polls {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {polls} status polls, got {actual}"
        )))
    }
}

#[then("the summary lists \"{failed}\" as failed and \"{succeeded}\" as succeeded")]
fn summary_lists(
    pipeline_context: &PipelineContext,
    failed: String,
    succeeded: String,
) -> Result<(), StepError> {
    let report = completed(pipeline_context)?;
    if report.failed() != [failed.as_str()] || report.succeeded() != [succeeded.as_str()] {
        return Err(StepError::Assertion(format!(
            "unexpected outcomes: {:?}",
            report.outcomes()
        )));
    }

    let summaries = pipeline_context.notifier.summaries();
    let [summary] = summaries.as_slice() else {
        return Err(StepError::Assertion(format!(
            "expected one summary, got {summaries:?}"
        )));
    };
    let expected_failed = format!("Task failed: [{failed}]");
    let expected_succeeded = format!("Task success: [{succeeded}]");
    if summary.contains(&expected_failed) && summary.contains(&expected_succeeded) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!("unexpected summary: {summary}")))
    }
}

#[then("each sync VM is stopped exactly once")]
fn each_vm_stopped_once(pipeline_context: &PipelineContext) -> Result<(), StepError> {
    let mut stops = pipeline_context.provider.stop_calls();
    stops.sort();
    let mut expected = pipeline_context.provider.start_calls();
    expected.sort();
    if stops == expected {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected stops {expected:?}, got {stops:?}"
        )))
    }
}

#[then("the run aborts")]
fn run_aborts(pipeline_context: &PipelineContext) -> Result<(), StepError> {
    match pipeline_context.outcome() {
        Some(PipelineOutcome::Aborted(_)) => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected an aborted run, got {other:?}"
        ))),
    }
}

#[then("one failure notification mentions \"{cause}\" and \"{url}\"")]
fn failure_notification_mentions(
    pipeline_context: &PipelineContext,
    cause: String,
    url: String,
) -> Result<(), StepError> {
    let failures = pipeline_context.notifier.failures();
    let [context] = failures.as_slice() else {
        return Err(StepError::Assertion(format!(
            "expected one failure notification, got {failures:?}"
        )));
    };
    if context.contains(&cause) && context.contains(&url) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "failure notification lacks details: {context}"
        )))
    }
}

#[then("no agent health check or launch was attempted")]
fn nothing_downstream(pipeline_context: &PipelineContext) -> Result<(), StepError> {
    let agent_calls = pipeline_context.transfer.agent_list_calls();
    let started = pipeline_context.transfer.started();
    if agent_calls == 0 && started.is_empty() && pipeline_context.notifier.summaries().is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "downstream stages ran: {agent_calls} agent listings, started {started:?}"
        )))
    }
}

#[then("the agent roster was listed \"{count}\" times")]
fn roster_listed(pipeline_context: &PipelineContext, count: usize) -> Result<(), StepError> {
    let actual = pipeline_context.transfer.agent_list_calls();
    if actual == count {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {count} agent listings, got {actual}"
        )))
    }
}

#[then("no time elapsed during the run")]
fn no_time_elapsed(pipeline_context: &PipelineContext) -> Result<(), StepError> {
    completed(pipeline_context)?;
    match pipeline_context.elapsed() {
        Some(Duration::ZERO) => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected no sleeps, observed {other:?}"
        ))),
    }
}
