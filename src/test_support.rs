//! Test support utilities shared across unit and integration tests.
//!
//! The doubles record every call and replay scripted responses, so pipeline
//! behaviour can be asserted without cloud credentials or real processes.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

use crate::command::{CommandError, CommandOutput, CommandRunner};
use crate::compute::{ComputeProvider, ComputeResource, PowerState, ProviderFuture, ResourceSelector};
use crate::notify::Notifier;
use crate::report::RunReport;
use crate::transfer::{
    AgentStatus, ExecutionStatus, SyncAgent, TaskExecution, TaskStatus, TaskSummary,
    TransferService,
};

/// Category tag carried by every resource built with [`resource`].
pub const TEST_RESOURCE_TAG: &str = "convoy-sync";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Error returned by the scripted doubles.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("{0}")]
pub struct ScriptedError(pub String);

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Arc<Mutex<VecDeque<CommandOutput>>>,
    invocations: Arc<Mutex<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        lock(&self.invocations).clone()
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        lock(&self.responses).push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32) {
        self.push_output(Some(code), "", "simulated failure");
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, CommandError> {
        lock(&self.invocations).push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
        });
        lock(&self.responses)
            .pop_front()
            .ok_or_else(|| CommandError {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            })
    }
}

/// Produces a payload matching `aws datasync list-agents --output json`.
#[must_use]
pub fn json_agents(agents: &[(&str, &str)]) -> String {
    let items = agents
        .iter()
        .enumerate()
        .map(|(position, (name, status))| {
            format!(
                "{{\"AgentArn\":\"arn:aws:datasync:us-west-2:111122223333:agent/agent-{position}\",\
                 \"Name\":\"{name}\",\"Status\":\"{status}\"}}"
            )
        })
        .collect::<Vec<_>>()
        .join(",");
    format!("{{\"Agents\":[{items}]}}")
}

/// Produces a payload matching `aws datasync list-tasks --output json`.
#[must_use]
pub fn json_tasks(tasks: &[(&str, &str, &str)]) -> String {
    let items = tasks
        .iter()
        .map(|(arn, name, status)| {
            format!("{{\"TaskArn\":\"{arn}\",\"Name\":\"{name}\",\"Status\":\"{status}\"}}")
        })
        .collect::<Vec<_>>()
        .join(",");
    format!("{{\"Tasks\":[{items}]}}")
}

/// Produces a payload matching `aws datasync list-task-executions --output json`.
#[must_use]
pub fn json_executions(executions: &[(&str, &str)]) -> String {
    let items = executions
        .iter()
        .map(|(arn, status)| format!("{{\"TaskExecutionArn\":\"{arn}\",\"Status\":\"{status}\"}}"))
        .collect::<Vec<_>>()
        .join(",");
    format!("{{\"TaskExecutions\":[{items}]}}")
}

/// Builds a resource tagged with [`TEST_RESOURCE_TAG`] and `label`.
#[must_use]
pub fn resource(id: &str, label: &str, state: PowerState) -> ComputeResource {
    ComputeResource {
        id: id.to_owned(),
        zone: String::from("fr-par-1"),
        name: format!("vm-{id}"),
        tags: vec![String::from(TEST_RESOURCE_TAG), label.to_owned()],
        state,
    }
}

/// Builds an agent that is online or offline.
#[must_use]
pub fn agent(name: &str, online: bool) -> SyncAgent {
    SyncAgent {
        name: name.to_owned(),
        status: if online {
            AgentStatus::Online
        } else {
            AgentStatus::Offline(String::from("OFFLINE"))
        },
    }
}

/// Builds a task listing entry from a raw service status.
#[must_use]
pub fn task(task_arn: &str, name: &str, status: &str) -> TaskSummary {
    TaskSummary {
        task_arn: task_arn.to_owned(),
        name: name.to_owned(),
        status: TaskStatus::from_service(status),
    }
}

/// Call recorded by [`ScriptedProvider`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ProviderCall {
    /// Resource listing.
    List,
    /// Start request for the resource id.
    Start(String),
    /// Readiness wait for the resource id.
    WaitUntilRunning(String),
    /// Stop request for the resource id.
    Stop(String),
}

#[derive(Debug, Default)]
struct ProviderState {
    resources: Vec<ComputeResource>,
    list_error: Option<String>,
    start_error: Option<String>,
    stop_error: Option<String>,
    calls: Vec<ProviderCall>,
}

/// In-memory compute provider.
#[derive(Clone, Debug, Default)]
pub struct ScriptedProvider {
    state: Arc<Mutex<ProviderState>>,
}

impl ScriptedProvider {
    /// Creates a provider exposing `resources`.
    #[must_use]
    pub fn new(resources: Vec<ComputeResource>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ProviderState {
                resources,
                ..ProviderState::default()
            })),
        }
    }

    /// Adds a resource to the listing.
    pub fn add_resource(&self, resource: ComputeResource) {
        lock(&self.state).resources.push(resource);
    }

    /// Makes every listing fail with `message`.
    pub fn fail_listing(&self, message: &str) {
        lock(&self.state).list_error = Some(message.to_owned());
    }

    /// Makes every start request fail with `message`.
    pub fn fail_start(&self, message: &str) {
        lock(&self.state).start_error = Some(message.to_owned());
    }

    /// Makes every stop request fail with `message`.
    pub fn fail_stop(&self, message: &str) {
        lock(&self.state).stop_error = Some(message.to_owned());
    }

    /// Every call made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<ProviderCall> {
        lock(&self.state).calls.clone()
    }

    /// Number of listing calls made so far.
    #[must_use]
    pub fn list_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| **call == ProviderCall::List)
            .count()
    }

    /// Resource ids passed to start requests.
    #[must_use]
    pub fn start_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ProviderCall::Start(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    /// Resource ids passed to stop requests.
    #[must_use]
    pub fn stop_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ProviderCall::Stop(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: ProviderCall) {
        lock(&self.state).calls.push(call);
    }
}

impl ComputeProvider for ScriptedProvider {
    type Error = ScriptedError;

    fn list_resources<'a>(
        &'a self,
        selector: &'a ResourceSelector,
    ) -> ProviderFuture<'a, Vec<ComputeResource>, Self::Error> {
        Box::pin(async move {
            self.record(ProviderCall::List);
            let state = lock(&self.state);
            if let Some(message) = &state.list_error {
                return Err(ScriptedError(message.clone()));
            }
            Ok(state
                .resources
                .iter()
                .filter(|resource| selector.matches(resource))
                .cloned()
                .collect())
        })
    }

    fn start<'a>(&'a self, resource: &'a ComputeResource) -> ProviderFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.record(ProviderCall::Start(resource.id.clone()));
            lock(&self.state)
                .start_error
                .clone()
                .map_or(Ok(()), |message| Err(ScriptedError(message)))
        })
    }

    fn wait_until_running<'a>(
        &'a self,
        resource: &'a ComputeResource,
    ) -> ProviderFuture<'a, ComputeResource, Self::Error> {
        Box::pin(async move {
            self.record(ProviderCall::WaitUntilRunning(resource.id.clone()));
            Ok(ComputeResource {
                state: PowerState::Running,
                ..resource.clone()
            })
        })
    }

    fn stop<'a>(&'a self, resource: &'a ComputeResource) -> ProviderFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.record(ProviderCall::Stop(resource.id.clone()));
            lock(&self.state)
                .stop_error
                .clone()
                .map_or(Ok(()), |message| Err(ScriptedError(message)))
        })
    }
}

#[derive(Debug, Default)]
struct TransferState {
    agent_polls: VecDeque<Vec<SyncAgent>>,
    last_agents: Vec<SyncAgent>,
    agent_error: Option<String>,
    agent_list_calls: usize,
    task_polls: VecDeque<Vec<TaskSummary>>,
    last_tasks: Vec<TaskSummary>,
    task_error: Option<String>,
    task_list_calls: usize,
    task_list_limits: Vec<u32>,
    executions: BTreeMap<String, Vec<TaskExecution>>,
    execution_error: Option<String>,
    execution_queries: Vec<(String, u32)>,
    start_errors: BTreeMap<String, String>,
    started: Vec<String>,
}

/// In-memory transfer service.
///
/// Agent and task listings replay queued snapshots in order; once the queue
/// is exhausted the last snapshot repeats.
#[derive(Clone, Debug, Default)]
pub struct ScriptedTransferService {
    state: Arc<Mutex<TransferState>>,
}

impl ScriptedTransferService {
    /// Creates a service with empty rosters and no tasks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues one agent listing.
    pub fn push_agents(&self, agents: Vec<SyncAgent>) {
        lock(&self.state).agent_polls.push_back(agents);
    }

    /// Queues one task listing.
    pub fn push_tasks(&self, tasks: Vec<TaskSummary>) {
        lock(&self.state).task_polls.push_back(tasks);
    }

    /// Sets the latest execution returned for `task_arn`.
    pub fn set_execution(&self, task_arn: &str, status: ExecutionStatus) {
        lock(&self.state).executions.insert(
            task_arn.to_owned(),
            vec![TaskExecution {
                execution_arn: format!("{task_arn}/execution/exec-1"),
                status,
            }],
        );
    }

    /// Makes agent listings fail with `message`.
    pub fn fail_agent_listing(&self, message: &str) {
        lock(&self.state).agent_error = Some(message.to_owned());
    }

    /// Makes task listings fail with `message`.
    pub fn fail_task_listing(&self, message: &str) {
        lock(&self.state).task_error = Some(message.to_owned());
    }

    /// Makes execution queries fail with `message`.
    pub fn fail_execution_query(&self, message: &str) {
        lock(&self.state).execution_error = Some(message.to_owned());
    }

    /// Makes starting `task_arn` fail with `message`.
    pub fn fail_start(&self, task_arn: &str, message: &str) {
        lock(&self.state)
            .start_errors
            .insert(task_arn.to_owned(), message.to_owned());
    }

    /// Number of agent listings performed.
    #[must_use]
    pub fn agent_list_calls(&self) -> usize {
        lock(&self.state).agent_list_calls
    }

    /// Number of task listings performed.
    #[must_use]
    pub fn task_list_calls(&self) -> usize {
        lock(&self.state).task_list_calls
    }

    /// Limits passed to task listings.
    #[must_use]
    pub fn task_list_limits(&self) -> Vec<u32> {
        lock(&self.state).task_list_limits.clone()
    }

    /// Task ARNs and limits passed to execution queries.
    #[must_use]
    pub fn execution_queries(&self) -> Vec<(String, u32)> {
        lock(&self.state).execution_queries.clone()
    }

    /// Task ARNs successfully started, in order.
    #[must_use]
    pub fn started(&self) -> Vec<String> {
        lock(&self.state).started.clone()
    }
}

impl TransferService for ScriptedTransferService {
    type Error = ScriptedError;

    fn list_agents(&self) -> ProviderFuture<'_, Vec<SyncAgent>, Self::Error> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.agent_list_calls += 1;
            if let Some(message) = &state.agent_error {
                return Err(ScriptedError(message.clone()));
            }
            if let Some(next) = state.agent_polls.pop_front() {
                state.last_agents = next;
            }
            Ok(state.last_agents.clone())
        })
    }

    fn list_tasks(&self, max_results: u32) -> ProviderFuture<'_, Vec<TaskSummary>, Self::Error> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.task_list_calls += 1;
            state.task_list_limits.push(max_results);
            if let Some(message) = &state.task_error {
                return Err(ScriptedError(message.clone()));
            }
            if let Some(next) = state.task_polls.pop_front() {
                state.last_tasks = next;
            }
            Ok(state.last_tasks.clone())
        })
    }

    fn start_task_execution<'a>(
        &'a self,
        task_arn: &'a str,
    ) -> ProviderFuture<'a, String, Self::Error> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            if let Some(message) = state.start_errors.get(task_arn) {
                return Err(ScriptedError(message.clone()));
            }
            state.started.push(task_arn.to_owned());
            Ok(format!("{task_arn}/execution/exec-1"))
        })
    }

    fn list_task_executions<'a>(
        &'a self,
        task_arn: &'a str,
        max_results: u32,
    ) -> ProviderFuture<'a, Vec<TaskExecution>, Self::Error> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state
                .execution_queries
                .push((task_arn.to_owned(), max_results));
            if let Some(message) = &state.execution_error {
                return Err(ScriptedError(message.clone()));
            }
            let limit = usize::try_from(max_results).unwrap_or(usize::MAX);
            Ok(state
                .executions
                .get(task_arn)
                .map(|executions| executions.iter().take(limit).cloned().collect())
                .unwrap_or_default())
        })
    }
}

/// Message captured by [`RecordingNotifier`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Notification {
    /// Failure context.
    Failure(String),
    /// Rendered run summary.
    Summary(String),
}

/// Notifier that records messages and can be told to fail.
#[derive(Clone, Debug, Default)]
pub struct RecordingNotifier {
    messages: Arc<Mutex<Vec<Notification>>>,
    failing: bool,
}

impl RecordingNotifier {
    /// Creates a notifier that accepts every message.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a notifier that records messages but reports a delivery error.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// Messages received so far.
    #[must_use]
    pub fn messages(&self) -> Vec<Notification> {
        lock(&self.messages).clone()
    }

    /// Failure contexts received so far.
    #[must_use]
    pub fn failures(&self) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter_map(|message| match message {
                Notification::Failure(context) => Some(context),
                Notification::Summary(_) => None,
            })
            .collect()
    }

    /// Summaries received so far.
    #[must_use]
    pub fn summaries(&self) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter_map(|message| match message {
                Notification::Summary(text) => Some(text),
                Notification::Failure(_) => None,
            })
            .collect()
    }

    fn deliver(&self, message: Notification) -> Result<(), ScriptedError> {
        lock(&self.messages).push(message);
        if self.failing {
            return Err(ScriptedError(String::from("notification channel unavailable")));
        }
        Ok(())
    }
}

impl Notifier for RecordingNotifier {
    type Error = ScriptedError;

    fn notify_failure<'a>(&'a self, context: &'a str) -> ProviderFuture<'a, (), Self::Error> {
        Box::pin(async move { self.deliver(Notification::Failure(context.to_owned())) })
    }

    fn notify_summary<'a>(&'a self, report: &'a RunReport) -> ProviderFuture<'a, (), Self::Error> {
        Box::pin(async move { self.deliver(Notification::Summary(report.render_summary())) })
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: AsyncMutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets and removes environment variables while holding a global mutex.
    ///
    /// A `None` value removes the variable for the lifetime of the guard.
    pub async fn set_vars(pairs: &[(&str, Option<&str>)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe {
                match value {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
