//! Configuration loading via `ortho-config`.
//!
//! Every section merges defaults, `convoy.toml`, and environment variables.
//! Validation errors name the environment variable and TOML key that supply
//! the missing value.

use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::compute::ResourceSelector;

/// Name of the configuration file searched for by every section.
pub const CONFIG_FILE_NAME: &str = "convoy.toml";

/// Default location of the stream manifest.
pub const DEFAULT_STREAMS_FILE: &str = "convoy-streams.toml";

/// Pipeline-level settings: streams, selection, and polling cadence.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "CONVOY",
    discovery(
        app_name = "convoy",
        env_var = "CONVOY_CONFIG_PATH",
        config_file_name = "convoy.toml",
        dotfile_name = ".convoy.toml",
        project_file_name = "convoy.toml"
    )
)]
pub struct PipelineConfig {
    /// Path of the TOML manifest listing the streams to migrate.
    #[ortho_config(default = DEFAULT_STREAMS_FILE.to_owned())]
    pub streams_file: String,
    /// Category tag shared by every compute resource taking part in the run.
    #[ortho_config(default = "convoy-sync".to_owned())]
    pub resource_tag: String,
    /// Seconds between two stream status polls.
    #[ortho_config(default = 300)]
    pub stream_poll_interval_secs: u64,
    /// Seconds between two agent health polls.
    #[ortho_config(default = 1)]
    pub agent_poll_interval_secs: u64,
    /// Maximum number of tasks fetched per status poll.
    #[ortho_config(default = 100)]
    pub task_list_limit: u32,
    /// CI job URL linked from failure notifications.
    pub ci_job_url: Option<String>,
    /// Exit with status 2 when a completed run has failed or unknown streams.
    #[ortho_config(default = false)]
    pub strict_exit: bool,
}

/// Metadata for a configuration field, used to generate actionable error messages.
pub(crate) struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    pub(crate) const fn new(
        description: &'static str,
        env_var: &'static str,
        toml_key: &'static str,
    ) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

/// Fails with an actionable [`ConfigError::MissingField`] when `value` is blank.
pub(crate) fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingField(format!(
            "missing {}: set {} or add {} to {CONFIG_FILE_NAME}",
            metadata.description, metadata.env_var, metadata.toml_key
        )));
    }
    Ok(())
}

impl PipelineConfig {
    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("convoy")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation on required fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty,
    /// or [`ConfigError::Invalid`] when a numeric setting is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_field(
            &self.streams_file,
            &FieldMetadata::new("stream manifest path", "CONVOY_STREAMS_FILE", "streams_file"),
        )?;
        require_field(
            &self.resource_tag,
            &FieldMetadata::new(
                "compute resource category tag",
                "CONVOY_RESOURCE_TAG",
                "resource_tag",
            ),
        )?;
        if self.stream_poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(String::from(
                "stream_poll_interval_secs must be at least 1",
            )));
        }
        if self.task_list_limit == 0 {
            return Err(ConfigError::Invalid(String::from(
                "task_list_limit must be at least 1",
            )));
        }
        Ok(())
    }

    /// Stream manifest location.
    #[must_use]
    pub fn streams_path(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(self.streams_file.trim())
    }

    /// Selector for the compute resources of this migration.
    #[must_use]
    pub fn selector(&self) -> ResourceSelector {
        ResourceSelector::tagged(self.resource_tag.trim())
    }

    /// Interval between stream status polls.
    #[must_use]
    pub const fn stream_poll_interval(&self) -> Duration {
        Duration::from_secs(self.stream_poll_interval_secs)
    }

    /// Interval between agent health polls.
    #[must_use]
    pub const fn agent_poll_interval(&self) -> Duration {
        Duration::from_secs(self.agent_poll_interval_secs)
    }

    /// CI job URL, falling back to the `CI_JOB_URL` variable set by CI
    /// runners.
    #[must_use]
    pub fn diagnostics_url(&self) -> Option<String> {
        self.ci_job_url
            .clone()
            .or_else(|| std::env::var("CI_JOB_URL").ok())
            .map(|url| url.trim().to_owned())
            .filter(|url| !url.is_empty())
    }
}

/// Scaleway credentials and zone for the sync agent VMs.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "SCW",
    discovery(
        app_name = "convoy",
        env_var = "CONVOY_CONFIG_PATH",
        config_file_name = "convoy.toml",
        dotfile_name = ".convoy.toml",
        project_file_name = "convoy.toml"
    )
)]
pub struct ScalewayConfig {
    /// Secret key used for authentication. This value is required.
    pub secret_key: String,
    /// Zone hosting the sync agent VMs. Defaults to `fr-par-1`.
    #[ortho_config(default = "fr-par-1".to_owned())]
    pub default_zone: String,
}

impl ScalewayConfig {
    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("convoy")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation on required fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_field(
            &self.secret_key,
            &FieldMetadata::new("Scaleway API secret key", "SCW_SECRET_KEY", "secret_key"),
        )?;
        require_field(
            &self.default_zone,
            &FieldMetadata::new("availability zone", "SCW_DEFAULT_ZONE", "default_zone"),
        )?;
        Ok(())
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a field holds a value outside its accepted range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
