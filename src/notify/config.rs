//! Slack credentials and destination channel.

use ortho_config::OrthoConfig;
use serde::Deserialize;

use crate::config::{ConfigError, FieldMetadata, require_field};

/// Default Slack Web API base URL.
pub const DEFAULT_SLACK_API_URL: &str = "https://slack.com/api";

/// Slack settings loaded via `ortho-config`.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "SLACK",
    discovery(
        app_name = "convoy",
        env_var = "CONVOY_CONFIG_PATH",
        config_file_name = "convoy.toml",
        dotfile_name = ".convoy.toml",
        project_file_name = "convoy.toml"
    )
)]
pub struct SlackConfig {
    /// Bot token sent as a bearer credential. This value is required.
    pub token: String,
    /// Channel receiving warnings and summaries. This value is required.
    pub channel: String,
    /// Base URL of the Web API; overridden in tests.
    #[ortho_config(default = DEFAULT_SLACK_API_URL.to_owned())]
    pub api_url: String,
}

impl SlackConfig {
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
            &self.token,
            &FieldMetadata::new("Slack bot token", "SLACK_TOKEN", "token"),
        )?;
        require_field(
            &self.channel,
            &FieldMetadata::new("Slack channel", "SLACK_CHANNEL", "channel"),
        )?;
        require_field(
            &self.api_url,
            &FieldMetadata::new("Slack API URL", "SLACK_API_URL", "api_url"),
        )?;
        Ok(())
    }
}
