//! Command-line interface definitions for the `convoy` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `convoy` binary.
#[derive(Debug, Parser)]
#[command(
    name = "convoy",
    about = "Power on sync agent VMs, run data transfers, and stop each VM when its stream finishes",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Run the migration pipeline once.
    #[command(name = "run", about = "Run the migration pipeline once")]
    Run(RunCommand),
}

/// Arguments for the `convoy run` subcommand.
#[derive(Debug, Default, Parser)]
pub(crate) struct RunCommand {
    /// Stream manifest to load instead of the configured `streams_file`.
    #[arg(long, value_name = "PATH")]
    pub(crate) streams_file: Option<String>,
    /// Exit with status 2 when any stream failed or ended with an unknown
    /// outcome.
    #[arg(long)]
    pub(crate) strict_exit: bool,
}
