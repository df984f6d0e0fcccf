//! Binary entry point for the Convoy CLI.

mod cli;

use std::io::{self, Write};
use std::process;

use clap::Parser;
use thiserror::Error;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use convoy::{
    DataSyncCli, DataSyncConfig, DataSyncError, MigrationPipeline, Notifier, PipelineConfig,
    PipelineError, RunReport, ScalewayConfig, ScalewayProvider, ScalewayProviderError,
    SlackConfig, SlackNotifier, StreamManifest, StreamOutcome, failure_message,
};

use cli::{Cli, RunCommand};

const EXIT_FATAL: i32 = 1;
const EXIT_STREAMS_FAILED: i32 = 2;

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("notifier error: {0}")]
    Notifier(String),
    #[error("stream manifest error: {0}")]
    Manifest(String),
    #[error("compute provider error: {0}")]
    Provider(String),
    #[error("transfer service error: {0}")]
    Transfer(String),
    #[error("migration run aborted: {0}")]
    Pipeline(#[from] PipelineError<ScalewayProviderError, DataSyncError>),
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            EXIT_FATAL
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

async fn dispatch(cli: Cli) -> Result<i32, CliError> {
    match cli {
        Cli::Run(command) => run_command(command).await,
    }
}

async fn run_command(args: RunCommand) -> Result<i32, CliError> {
    let mut config =
        PipelineConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    apply_overrides(&mut config, &args);

    let slack_config =
        SlackConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    let notifier =
        SlackNotifier::new(&slack_config).map_err(|err| CliError::Notifier(err.to_string()))?;

    let diagnostics_url = config.diagnostics_url();
    let prepared = match prepare(&config) {
        Ok(prepared) => prepared,
        Err(err) => {
            notify_setup_failure(&notifier, &err, diagnostics_url.as_deref()).await;
            return Err(err);
        }
    };

    let (manifest, provider, transfer) = prepared;
    let pipeline = MigrationPipeline::new(provider, transfer, notifier, config.selector())
        .with_agent_poll_interval(config.agent_poll_interval())
        .with_stream_poll_interval(config.stream_poll_interval())
        .with_task_list_limit(config.task_list_limit)
        .with_diagnostics_url(diagnostics_url);

    let report = pipeline.run(&manifest).await?;
    Ok(exit_code_for(&report, config.strict_exit))
}

type Prepared = (
    StreamManifest,
    ScalewayProvider,
    DataSyncCli<convoy::ProcessCommandRunner>,
);

fn prepare(config: &PipelineConfig) -> Result<Prepared, CliError> {
    config
        .validate()
        .map_err(|err| CliError::Config(err.to_string()))?;
    let manifest = StreamManifest::load(&config.streams_path())
        .map_err(|err| CliError::Manifest(err.to_string()))?;

    let scaleway_config =
        ScalewayConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    let provider = ScalewayProvider::new(&scaleway_config)
        .map_err(|err| CliError::Provider(err.to_string()))?;

    let datasync_config =
        DataSyncConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    let transfer = DataSyncCli::with_process_runner(datasync_config)
        .map_err(|err| CliError::Transfer(err.to_string()))?;

    Ok((manifest, provider, transfer))
}

fn apply_overrides(config: &mut PipelineConfig, args: &RunCommand) {
    if let Some(path) = &args.streams_file {
        config.streams_file.clone_from(path);
    }
    if args.strict_exit {
        config.strict_exit = true;
    }
}

async fn notify_setup_failure<N: Notifier>(
    notifier: &N,
    err: &CliError,
    diagnostics_url: Option<&str>,
) {
    let message = failure_message(&err.to_string(), diagnostics_url);
    if let Err(notify_err) = notifier.notify_failure(&message).await {
        warn!(error = %notify_err, "failed to deliver failure notification");
    }
}

fn exit_code_for(report: &RunReport, strict: bool) -> i32 {
    let incomplete = !report.failed().is_empty()
        || !report.streams_with(StreamOutcome::Unknown).is_empty();
    if strict && incomplete {
        EXIT_STREAMS_FAILED
    } else {
        0
    }
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
