//! Unit tests for the stream monitor state machine.

use super::*;
use crate::compute::PowerState;
use crate::test_support::{ScriptedProvider, ScriptedTransferService, resource, task};
use chrono::Utc;
use rstest::{fixture, rstest};

const INTERVAL: Duration = Duration::from_secs(300);

struct Harness {
    provider: ScriptedProvider,
    transfer: ScriptedTransferService,
    index: ResourceIndex,
    streams: Vec<StreamSpec>,
}

fn harness_for(names: &[&str]) -> Harness {
    let streams = names
        .iter()
        .map(|name| StreamSpec::new(*name, format!("arn:task/{name}"), format!("SYNC-{name}")))
        .collect::<Vec<_>>();
    let resources = names
        .iter()
        .map(|name| resource(&format!("srv-{name}"), &format!("SYNC-{name}"), PowerState::Running))
        .collect::<Vec<_>>();
    let index = ResourceIndex::build(&resources, &streams).expect("index should build");
    Harness {
        provider: ScriptedProvider::new(resources),
        transfer: ScriptedTransferService::new(),
        index,
        streams,
    }
}

#[fixture]
fn alpha_beta() -> Harness {
    harness_for(&["alpha", "beta"])
}

#[fixture]
fn report() -> RunReport {
    RunReport::new(Utc::now())
}

fn tasks(statuses: &[(&str, &str)]) -> Vec<TaskSummary> {
    statuses
        .iter()
        .map(|(name, status)| task(&format!("arn:task/{name}"), name, status))
        .collect()
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn alpha_succeeds_then_beta_fails(alpha_beta: Harness, mut report: RunReport) {
    let h = alpha_beta;
    h.transfer.push_tasks(tasks(&[("alpha", "RUNNING"), ("beta", "RUNNING")]));
    h.transfer.push_tasks(tasks(&[("alpha", "AVAILABLE"), ("beta", "RUNNING")]));
    h.transfer.push_tasks(tasks(&[("alpha", "UNAVAILABLE"), ("beta", "AVAILABLE")]));
    h.transfer.set_execution("arn:task/alpha", ExecutionStatus::Success);
    h.transfer.set_execution("arn:task/beta", ExecutionStatus::Error);
    let started = tokio::time::Instant::now();

    let mut monitor = StreamMonitor::new(&h.provider, &h.transfer, &h.index, &h.streams)
        .with_poll_interval(INTERVAL);
    let polls = monitor.run(&mut report).await.expect("monitor should finish");

    assert_eq!(polls, 3);
    assert_eq!(started.elapsed(), INTERVAL * 2);
    assert_eq!(report.succeeded(), vec!["alpha"]);
    assert_eq!(report.failed(), vec!["beta"]);
    assert_eq!(
        h.provider.stop_calls(),
        vec![String::from("srv-alpha"), String::from("srv-beta")]
    );
    assert_eq!(
        monitor.phase("alpha"),
        Some(StreamPhase::Terminal(StreamOutcome::Succeeded))
    );
    assert_eq!(
        monitor.phase("beta"),
        Some(StreamPhase::Terminal(StreamOutcome::Failed))
    );
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn unavailable_after_terminal_never_stops_twice(alpha_beta: Harness, mut report: RunReport) {
    let h = alpha_beta;
    h.transfer.push_tasks(tasks(&[("alpha", "AVAILABLE"), ("beta", "RUNNING")]));
    for _ in 0..4 {
        h.transfer.push_tasks(tasks(&[("alpha", "UNAVAILABLE"), ("beta", "RUNNING")]));
    }
    h.transfer.push_tasks(tasks(&[("alpha", "UNAVAILABLE"), ("beta", "AVAILABLE")]));
    h.transfer.set_execution("arn:task/alpha", ExecutionStatus::Success);
    h.transfer.set_execution("arn:task/beta", ExecutionStatus::Success);

    let mut monitor = StreamMonitor::new(&h.provider, &h.transfer, &h.index, &h.streams)
        .with_poll_interval(INTERVAL);
    let polls = monitor.run(&mut report).await.expect("monitor should finish");

    assert_eq!(polls, 6);
    let alpha_stops = h
        .provider
        .stop_calls()
        .iter()
        .filter(|id| id.as_str() == "srv-alpha")
        .count();
    assert_eq!(alpha_stops, 1);
    assert_eq!(report.outcomes().len(), 2);
}

#[rstest]
#[tokio::test]
async fn repolling_terminal_streams_is_a_no_op(alpha_beta: Harness, mut report: RunReport) {
    let h = alpha_beta;
    h.transfer.push_tasks(tasks(&[("alpha", "AVAILABLE"), ("beta", "AVAILABLE")]));
    h.transfer.set_execution("arn:task/alpha", ExecutionStatus::Success);
    h.transfer.set_execution("arn:task/beta", ExecutionStatus::Success);

    let mut monitor = StreamMonitor::new(&h.provider, &h.transfer, &h.index, &h.streams);
    monitor.poll_once(&mut report).await.expect("first poll");
    assert!(monitor.all_terminal());
    let snapshot = report.clone();

    monitor.poll_once(&mut report).await.expect("second poll");

    assert_eq!(report, snapshot);
    assert_eq!(h.provider.stop_calls().len(), 2);
    assert_eq!(h.transfer.execution_queries().len(), 2);
}

#[rstest]
#[case::single(&[1])]
#[case::staggered(&[1, 3, 2])]
#[case::last_first(&[4, 1])]
#[tokio::test(start_paused = true)]
async fn polls_until_the_slowest_stream_finishes(#[case] finish_on: &[u32], mut report: RunReport) {
    let names = (0..finish_on.len())
        .map(|position| format!("s{position}"))
        .collect::<Vec<_>>();
    let name_refs = names.iter().map(String::as_str).collect::<Vec<_>>();
    let h = harness_for(&name_refs);
    let max = finish_on.iter().copied().max().unwrap_or(1);
    for poll in 1..=max {
        let statuses = names
            .iter()
            .zip(finish_on)
            .map(|(name, finish)| {
                let status = match poll.cmp(finish) {
                    std::cmp::Ordering::Less => "RUNNING",
                    std::cmp::Ordering::Equal => "AVAILABLE",
                    std::cmp::Ordering::Greater => "UNAVAILABLE",
                };
                (name.as_str(), status)
            })
            .collect::<Vec<_>>();
        h.transfer.push_tasks(tasks(&statuses));
    }
    for name in &names {
        h.transfer
            .set_execution(&format!("arn:task/{name}"), ExecutionStatus::Success);
    }
    let started = tokio::time::Instant::now();

    let mut monitor = StreamMonitor::new(&h.provider, &h.transfer, &h.index, &h.streams)
        .with_poll_interval(INTERVAL);
    let polls = monitor.run(&mut report).await.expect("monitor should finish");

    assert_eq!(polls, max);
    assert_eq!(h.transfer.task_list_calls(), usize::try_from(max).unwrap_or(usize::MAX));
    assert_eq!(started.elapsed(), INTERVAL * (max - 1));
    assert_eq!(h.provider.stop_calls().len(), names.len());
}

#[rstest]
#[tokio::test]
async fn execution_query_uses_listed_task_and_single_result(
    alpha_beta: Harness,
    mut report: RunReport,
) {
    let h = alpha_beta;
    h.transfer.push_tasks(tasks(&[("alpha", "AVAILABLE"), ("beta", "QUEUED")]));

    let mut monitor = StreamMonitor::new(&h.provider, &h.transfer, &h.index, &h.streams)
        .with_task_list_limit(25);
    monitor.poll_once(&mut report).await.expect("poll");

    assert_eq!(h.transfer.task_list_limits(), vec![25]);
    assert_eq!(
        h.transfer.execution_queries(),
        vec![(String::from("arn:task/alpha"), 1)]
    );
    assert_eq!(
        monitor.phase("alpha"),
        Some(StreamPhase::Terminal(StreamOutcome::Unknown))
    );
    assert_eq!(monitor.phase("beta"), Some(StreamPhase::Pending));
}

#[rstest]
#[tokio::test]
async fn missing_tasks_stay_pending(alpha_beta: Harness, mut report: RunReport) {
    let h = alpha_beta;
    h.transfer.push_tasks(tasks(&[("alpha", "QUEUED")]));

    let mut monitor = StreamMonitor::new(&h.provider, &h.transfer, &h.index, &h.streams);
    monitor.poll_once(&mut report).await.expect("poll");

    assert_eq!(monitor.phase("alpha"), Some(StreamPhase::Pending));
    assert_eq!(monitor.phase("beta"), Some(StreamPhase::Pending));
    assert!(report.outcomes().is_empty());
    assert!(h.provider.stop_calls().is_empty());
}

#[rstest]
#[tokio::test]
async fn unrecognised_status_finishes_the_stream(alpha_beta: Harness, mut report: RunReport) {
    let h = alpha_beta;
    h.transfer.push_tasks(tasks(&[("alpha", "DELETING"), ("beta", "RUNNING")]));
    h.transfer.push_tasks(tasks(&[("alpha", "DELETING"), ("beta", "RUNNING")]));
    h.transfer.set_execution("arn:task/alpha", ExecutionStatus::Error);

    let mut monitor = StreamMonitor::new(&h.provider, &h.transfer, &h.index, &h.streams);
    monitor.poll_once(&mut report).await.expect("first poll");
    monitor.poll_once(&mut report).await.expect("second poll");

    assert_eq!(
        monitor.phase("alpha"),
        Some(StreamPhase::Terminal(StreamOutcome::Failed))
    );
    assert_eq!(monitor.phase("beta"), Some(StreamPhase::Pending));
    assert_eq!(report.failed(), vec!["alpha"]);
    assert_eq!(h.provider.stop_calls(), vec![String::from("srv-alpha")]);
    assert_eq!(
        h.transfer.execution_queries(),
        vec![(String::from("arn:task/alpha"), 1)]
    );
}

#[rstest]
#[tokio::test]
async fn stop_failure_is_recorded_and_not_fatal(alpha_beta: Harness, mut report: RunReport) {
    let h = alpha_beta;
    h.provider.fail_stop("instance locked");
    h.transfer.push_tasks(tasks(&[("alpha", "AVAILABLE"), ("beta", "AVAILABLE")]));
    h.transfer.set_execution("arn:task/alpha", ExecutionStatus::Success);
    h.transfer.set_execution("arn:task/beta", ExecutionStatus::Success);

    let mut monitor = StreamMonitor::new(&h.provider, &h.transfer, &h.index, &h.streams);
    let polls = monitor.run(&mut report).await.expect("monitor should finish");

    assert_eq!(polls, 1);
    assert_eq!(report.succeeded(), vec!["alpha", "beta"]);
    let failed_teardowns = report
        .teardown_failures()
        .iter()
        .map(|failure| (failure.stream.as_str(), failure.message.as_str()))
        .collect::<Vec<_>>();
    assert_eq!(
        failed_teardowns,
        vec![("alpha", "instance locked"), ("beta", "instance locked")]
    );
}

#[rstest]
#[tokio::test]
async fn listing_error_is_fatal(alpha_beta: Harness, mut report: RunReport) {
    let h = alpha_beta;
    h.transfer.fail_task_listing("ThrottlingException");

    let mut monitor = StreamMonitor::new(&h.provider, &h.transfer, &h.index, &h.streams);
    let err = monitor.run(&mut report).await.expect_err("listing should fail");

    assert_eq!(err.to_string(), "ThrottlingException");
    assert!(h.provider.stop_calls().is_empty());
}

#[rstest]
#[tokio::test]
async fn execution_query_error_is_fatal(alpha_beta: Harness, mut report: RunReport) {
    let h = alpha_beta;
    h.transfer.push_tasks(tasks(&[("alpha", "AVAILABLE"), ("beta", "RUNNING")]));
    h.transfer.fail_execution_query("AccessDenied");

    let mut monitor = StreamMonitor::new(&h.provider, &h.transfer, &h.index, &h.streams);
    let result = monitor.poll_once(&mut report).await;

    assert!(result.is_err());
    assert!(report.outcomes().is_empty());
    assert_eq!(monitor.phase("alpha"), Some(StreamPhase::Pending));
}
