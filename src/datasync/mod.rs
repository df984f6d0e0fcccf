//! AWS DataSync adapter that shells out to the `aws` CLI.
//!
//! Every call runs `aws datasync <operation> ... --output json` through a
//! [`CommandRunner`] and parses the JSON payload. Listing calls pass
//! `--no-paginate` so `--max-results` bounds the response exactly.

mod config;

use std::ffi::OsString;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::command::{CommandError, CommandOutput, CommandRunner, ProcessCommandRunner};
use crate::compute::ProviderFuture;
use crate::transfer::{
    AgentStatus, ExecutionStatus, SyncAgent, TaskExecution, TaskStatus, TaskSummary,
    TransferService,
};

pub use config::{DEFAULT_AWS_BIN, DataSyncConfig};

/// Errors returned by the DataSync adapter.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum DataSyncError {
    /// Raised when configuration is missing required values.
    #[error("configuration error: {0}")]
    Config(String),
    /// Raised when the CLI cannot be started.
    #[error(transparent)]
    Command(#[from] CommandError),
    /// Raised when the CLI returns a non-zero exit status.
    #[error("{program} datasync {operation} exited with status {status_text}: {stderr}")]
    CommandFailure {
        /// Program that failed (typically `aws`).
        program: String,
        /// DataSync operation being invoked.
        operation: String,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stderr captured from the command.
        stderr: String,
    },
    /// Raised when JSON output from the CLI cannot be parsed.
    #[error("failed to parse {operation} output: {message}")]
    Parse {
        /// DataSync operation whose output was parsed.
        operation: String,
        /// Parser error message.
        message: String,
    },
}

/// DataSync client driving the AWS CLI.
#[derive(Clone, Debug)]
pub struct DataSyncCli<R: CommandRunner> {
    config: DataSyncConfig,
    runner: R,
}

impl DataSyncCli<ProcessCommandRunner> {
    /// Creates a client wired to the real process runner.
    ///
    /// # Errors
    ///
    /// Returns [`DataSyncError::Config`] when validation fails.
    pub fn with_process_runner(config: DataSyncConfig) -> Result<Self, DataSyncError> {
        Self::new(config, ProcessCommandRunner)
    }
}

impl<R: CommandRunner> DataSyncCli<R> {
    /// Creates a client using the provided configuration and runner.
    ///
    /// # Errors
    ///
    /// Returns [`DataSyncError::Config`] when validation fails.
    pub fn new(config: DataSyncConfig, runner: R) -> Result<Self, DataSyncError> {
        config
            .validate()
            .map_err(|err| DataSyncError::Config(err.to_string()))?;
        Ok(Self { config, runner })
    }

    /// Builds the argument vector for a DataSync operation.
    fn build_args(&self, operation: &str, extra: &[OsString]) -> Vec<OsString> {
        let mut args = vec![OsString::from("datasync"), OsString::from(operation)];
        args.extend(extra.iter().cloned());
        args.push(OsString::from("--region"));
        args.push(OsString::from(self.config.region.trim()));
        if let Some(profile) = &self.config.profile {
            args.push(OsString::from("--profile"));
            args.push(OsString::from(profile.trim()));
        }
        args.push(OsString::from("--output"));
        args.push(OsString::from("json"));
        args
    }

    fn check_output(
        &self,
        output: CommandOutput,
        operation: &str,
    ) -> Result<CommandOutput, DataSyncError> {
        if output.is_success() {
            return Ok(output);
        }

        Err(DataSyncError::CommandFailure {
            program: self.config.aws_bin.clone(),
            operation: operation.to_owned(),
            status_text: output.status_text(),
            stderr: output.stderr.trim().to_owned(),
        })
    }

    fn run_json<T>(&self, operation: &str, extra: &[OsString]) -> Result<T, DataSyncError>
    where
        T: DeserializeOwned,
    {
        let args = self.build_args(operation, extra);
        debug!(operation, "invoking aws datasync");
        let output = self.runner.run(self.config.aws_bin.trim(), &args)?;
        let checked = self.check_output(output, operation)?;
        serde_json::from_str::<T>(&checked.stdout).map_err(|err| DataSyncError::Parse {
            operation: operation.to_owned(),
            message: err.to_string(),
        })
    }

    fn agents(&self) -> Result<Vec<SyncAgent>, DataSyncError> {
        let payload: ListAgentsOutput = self.run_json("list-agents", &[])?;
        Ok(payload
            .agents
            .into_iter()
            .map(|agent| SyncAgent {
                name: agent.name.unwrap_or(agent.agent_arn),
                status: AgentStatus::from_service(&agent.status),
            })
            .collect())
    }

    fn tasks(&self, max_results: u32) -> Result<Vec<TaskSummary>, DataSyncError> {
        let extra = [
            OsString::from("--max-results"),
            OsString::from(max_results.to_string()),
            OsString::from("--no-paginate"),
        ];
        let payload: ListTasksOutput = self.run_json("list-tasks", &extra)?;
        Ok(payload
            .tasks
            .into_iter()
            .map(|task| TaskSummary {
                name: task.name.unwrap_or_else(|| task.task_arn.clone()),
                task_arn: task.task_arn,
                status: TaskStatus::from_service(&task.status),
            })
            .collect())
    }

    fn start(&self, task_arn: &str) -> Result<String, DataSyncError> {
        let extra = [OsString::from("--task-arn"), OsString::from(task_arn)];
        let payload: StartTaskExecutionOutput = self.run_json("start-task-execution", &extra)?;
        Ok(payload.task_execution_arn)
    }

    fn executions(
        &self,
        task_arn: &str,
        max_results: u32,
    ) -> Result<Vec<TaskExecution>, DataSyncError> {
        let extra = [
            OsString::from("--task-arn"),
            OsString::from(task_arn),
            OsString::from("--max-results"),
            OsString::from(max_results.to_string()),
            OsString::from("--no-paginate"),
        ];
        let payload: ListTaskExecutionsOutput = self.run_json("list-task-executions", &extra)?;
        Ok(payload
            .task_executions
            .into_iter()
            .map(|execution| TaskExecution {
                execution_arn: execution.task_execution_arn,
                status: ExecutionStatus::from_service(&execution.status),
            })
            .collect())
    }
}

impl<R: CommandRunner> TransferService for DataSyncCli<R> {
    type Error = DataSyncError;

    fn list_agents(&self) -> ProviderFuture<'_, Vec<SyncAgent>, Self::Error> {
        Box::pin(async move { self.agents() })
    }

    fn list_tasks(&self, max_results: u32) -> ProviderFuture<'_, Vec<TaskSummary>, Self::Error> {
        Box::pin(async move { self.tasks(max_results) })
    }

    fn start_task_execution<'a>(
        &'a self,
        task_arn: &'a str,
    ) -> ProviderFuture<'a, String, Self::Error> {
        Box::pin(async move { self.start(task_arn) })
    }

    fn list_task_executions<'a>(
        &'a self,
        task_arn: &'a str,
        max_results: u32,
    ) -> ProviderFuture<'a, Vec<TaskExecution>, Self::Error> {
        Box::pin(async move { self.executions(task_arn, max_results) })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListAgentsOutput {
    #[serde(default)]
    agents: Vec<AgentEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AgentEntry {
    agent_arn: String,
    #[serde(default)]
    name: Option<String>,
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListTasksOutput {
    #[serde(default)]
    tasks: Vec<TaskEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TaskEntry {
    task_arn: String,
    #[serde(default)]
    name: Option<String>,
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StartTaskExecutionOutput {
    task_execution_arn: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListTaskExecutionsOutput {
    #[serde(default)]
    task_executions: Vec<ExecutionEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ExecutionEntry {
    task_execution_arn: String,
    status: String,
}
