//! Core library for the Convoy migration pipeline.
//!
//! A run powers on the tagged VMs hosting remote sync agents, waits for the
//! agents to come online, starts one transfer task per configured stream,
//! and polls the tasks until each is finished, stopping every VM as soon as
//! its stream is done. Outcomes are collected in a [`RunReport`] and sent to
//! a [`Notifier`].
//!
//! Collaborators sit behind traits: [`ComputeProvider`] (Scaleway),
//! [`TransferService`] (AWS DataSync via the `aws` CLI), and [`Notifier`]
//! (Slack).

pub mod command;
pub mod compute;
pub mod config;
pub mod datasync;
pub mod health;
pub mod launcher;
pub mod manifest;
pub mod monitor;
pub mod notify;
pub mod provisioner;
pub mod report;
pub mod run;
pub mod scaleway;
pub mod test_support;
pub mod transfer;

pub use command::{CommandError, CommandOutput, CommandRunner, ProcessCommandRunner};
pub use compute::{ComputeProvider, ComputeResource, PowerState, ResourceSelector};
pub use config::{ConfigError, PipelineConfig, ScalewayConfig};
pub use datasync::{DataSyncCli, DataSyncConfig, DataSyncError};
pub use health::{AgentHealthGate, all_online};
pub use launcher::{LaunchError, LaunchedStream, TransferLauncher};
pub use manifest::{ManifestError, StreamManifest, StreamSpec};
pub use monitor::{StreamMonitor, StreamPhase};
pub use notify::{Notifier, NotifyError, SlackConfig, SlackNotifier};
pub use provisioner::{ResourceIndex, ResourceIndexError, ResourceProvisioner};
pub use report::{RunReport, StreamOutcome, TeardownFailure};
pub use run::{MigrationPipeline, PipelineError, failure_message};
pub use scaleway::{ScalewayProvider, ScalewayProviderError};
pub use transfer::{
    AgentStatus, ExecutionStatus, SyncAgent, TaskExecution, TaskStatus, TaskSummary,
    TransferService,
};
