//! Transfer service abstraction: sync agents, tasks, and executions.

use std::fmt;

use crate::compute::ProviderFuture;

/// Health reported for a sync agent.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AgentStatus {
    /// Agent is connected and able to run tasks.
    Online,
    /// Any other status, kept verbatim for logging.
    Offline(String),
}

impl AgentStatus {
    /// Maps a service status string onto an [`AgentStatus`].
    #[must_use]
    pub fn from_service(raw: &str) -> Self {
        if raw == "ONLINE" {
            Self::Online
        } else {
            Self::Offline(raw.to_owned())
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Online => f.write_str("ONLINE"),
            Self::Offline(raw) => f.write_str(raw),
        }
    }
}

/// Remote agent performing the data movement.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SyncAgent {
    /// Agent name.
    pub name: String,
    /// Current health.
    pub status: AgentStatus,
}

impl SyncAgent {
    /// Returns `true` when the agent reports online.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.status == AgentStatus::Online
    }
}

/// Lifecycle status of a transfer task.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TaskStatus {
    /// Idle; the last execution, if any, has finished.
    Available,
    /// Task is still being created.
    Creating,
    /// An execution is queued.
    Queued,
    /// An execution is in progress.
    Running,
    /// The agent backing the task cannot be reached.
    Unavailable,
    /// Unrecognised status, kept verbatim.
    Other(String),
}

impl TaskStatus {
    /// Maps a service status string onto a [`TaskStatus`].
    #[must_use]
    pub fn from_service(raw: &str) -> Self {
        match raw {
            "AVAILABLE" => Self::Available,
            "CREATING" => Self::Creating,
            "QUEUED" => Self::Queued,
            "RUNNING" => Self::Running,
            "UNAVAILABLE" => Self::Unavailable,
            other => Self::Other(other.to_owned()),
        }
    }

    /// Returns `true` while work for the task is pending or underway.
    #[must_use]
    pub const fn is_in_progress(&self) -> bool {
        matches!(self, Self::Creating | Self::Queued | Self::Running)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available => f.write_str("AVAILABLE"),
            Self::Creating => f.write_str("CREATING"),
            Self::Queued => f.write_str("QUEUED"),
            Self::Running => f.write_str("RUNNING"),
            Self::Unavailable => f.write_str("UNAVAILABLE"),
            Self::Other(raw) => f.write_str(raw),
        }
    }
}

/// Entry returned by a task listing.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TaskSummary {
    /// Task identifier (ARN for DataSync).
    pub task_arn: String,
    /// Task name; streams are matched on this value.
    pub name: String,
    /// Current lifecycle status.
    pub status: TaskStatus,
}

/// Status of a single task execution.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ExecutionStatus {
    /// Execution finished without errors.
    Success,
    /// Execution finished with errors.
    Error,
    /// Execution still in one of its intermediate phases, or unrecognised.
    InProgress(String),
}

impl ExecutionStatus {
    /// Maps a service status string onto an [`ExecutionStatus`].
    #[must_use]
    pub fn from_service(raw: &str) -> Self {
        match raw {
            "SUCCESS" => Self::Success,
            "ERROR" => Self::Error,
            other => Self::InProgress(other.to_owned()),
        }
    }
}

/// Record of a task execution.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TaskExecution {
    /// Execution identifier.
    pub execution_arn: String,
    /// Execution status.
    pub status: ExecutionStatus,
}

/// Interface to the remote task-execution service.
pub trait TransferService: Send + Sync {
    /// Service specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Lists every registered sync agent.
    fn list_agents(&self) -> ProviderFuture<'_, Vec<SyncAgent>, Self::Error>;

    /// Lists up to `max_results` tasks.
    fn list_tasks(&self, max_results: u32) -> ProviderFuture<'_, Vec<TaskSummary>, Self::Error>;

    /// Starts a new execution of `task_arn` and returns the execution id.
    fn start_task_execution<'a>(
        &'a self,
        task_arn: &'a str,
    ) -> ProviderFuture<'a, String, Self::Error>;

    /// Lists up to `max_results` executions of `task_arn`, most recent first.
    fn list_task_executions<'a>(
        &'a self,
        task_arn: &'a str,
        max_results: u32,
    ) -> ProviderFuture<'a, Vec<TaskExecution>, Self::Error>;
}
