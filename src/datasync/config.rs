//! Settings for the `aws datasync` command-line adapter.

use ortho_config::OrthoConfig;
use serde::Deserialize;

use crate::config::{ConfigError, FieldMetadata, require_field};

/// Default AWS CLI binary name.
pub const DEFAULT_AWS_BIN: &str = "aws";

/// AWS CLI invocation settings loaded via `ortho-config`.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "CONVOY_DATASYNC",
    discovery(
        app_name = "convoy",
        env_var = "CONVOY_CONFIG_PATH",
        config_file_name = "convoy.toml",
        dotfile_name = ".convoy.toml",
        project_file_name = "convoy.toml"
    )
)]
pub struct DataSyncConfig {
    /// Path to the `aws` executable.
    #[ortho_config(default = DEFAULT_AWS_BIN.to_owned())]
    pub aws_bin: String,
    /// Region hosting the DataSync tasks and agents.
    #[ortho_config(default = "us-west-2".to_owned())]
    pub region: String,
    /// Named profile passed to the CLI; the CLI default chain applies when
    /// unset.
    pub profile: Option<String>,
}

impl DataSyncConfig {
    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("convoy")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Ensures the binary and region are present and that a configured
    /// profile is not blank.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_field(
            &self.aws_bin,
            &FieldMetadata::new("AWS CLI binary", "CONVOY_DATASYNC_AWS_BIN", "aws_bin"),
        )?;
        require_field(
            &self.region,
            &FieldMetadata::new("DataSync region", "CONVOY_DATASYNC_REGION", "region"),
        )?;
        if let Some(profile) = &self.profile {
            require_field(
                profile,
                &FieldMetadata::new("AWS profile", "CONVOY_DATASYNC_PROFILE", "profile"),
            )?;
        }
        Ok(())
    }
}
