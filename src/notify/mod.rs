//! Run notifications: stage warnings and the final summary.

mod config;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::compute::ProviderFuture;
use crate::report::RunReport;

pub use config::{DEFAULT_SLACK_API_URL, SlackConfig};

/// Upper bound on one Slack request, connection included.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Destination for run warnings and summaries.
///
/// Callers treat delivery as best effort: errors are logged and never change
/// the outcome of a run.
pub trait Notifier: Send + Sync {
    /// Transport specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Reports a fatal stage failure described by `context`.
    fn notify_failure<'a>(&'a self, context: &'a str) -> ProviderFuture<'a, (), Self::Error>;

    /// Reports the outcome of a completed run.
    fn notify_summary<'a>(&'a self, report: &'a RunReport) -> ProviderFuture<'a, (), Self::Error>;
}

/// Errors raised while posting to Slack.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Raised when configuration is missing required values.
    #[error("configuration error: {0}")]
    Config(String),
    /// Raised when the HTTP request cannot be completed.
    #[error("slack request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Raised when Slack answers with a non-success HTTP status.
    #[error("slack returned HTTP {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },
    /// Raised when Slack accepts the request but reports `ok: false`.
    #[error("slack rejected the message: {error}")]
    Rejected {
        /// Error code returned by the Web API.
        error: String,
    },
}

#[derive(Debug, Serialize)]
struct PostMessage<'a> {
    channel: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Notifier posting plain-text messages through `chat.postMessage`.
#[derive(Clone, Debug)]
pub struct SlackNotifier {
    client: reqwest::Client,
    endpoint: String,
    token: String,
    channel: String,
}

impl SlackNotifier {
    /// Builds a notifier from validated configuration. Requests time out
    /// after [`DEFAULT_HTTP_TIMEOUT`].
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Config`] when validation fails, or
    /// [`NotifyError::Http`] when the HTTP client cannot be built.
    pub fn new(config: &SlackConfig) -> Result<Self, NotifyError> {
        Self::with_timeout(config, DEFAULT_HTTP_TIMEOUT)
    }

    /// Builds a notifier whose requests give up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Config`] when validation fails, or
    /// [`NotifyError::Http`] when the HTTP client cannot be built.
    pub fn with_timeout(config: &SlackConfig, timeout: Duration) -> Result<Self, NotifyError> {
        config
            .validate()
            .map_err(|err| NotifyError::Config(err.to_string()))?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat.postMessage", config.api_url.trim().trim_end_matches('/')),
            token: config.token.trim().to_owned(),
            channel: config.channel.trim().to_owned(),
        })
    }

    /// Posts `text` to the configured channel.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] when the request fails or Slack rejects it.
    pub async fn post(&self, text: &str) -> Result<(), NotifyError> {
        debug!(channel = %self.channel, "posting slack message");
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&PostMessage {
                channel: &self.channel,
                text,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status {
                status: status.as_u16(),
            });
        }

        let body: PostMessageResponse = response.json().await?;
        if body.ok {
            return Ok(());
        }
        Err(NotifyError::Rejected {
            error: body.error.unwrap_or_else(|| String::from("unknown_error")),
        })
    }
}

impl Notifier for SlackNotifier {
    type Error = NotifyError;

    fn notify_failure<'a>(&'a self, context: &'a str) -> ProviderFuture<'a, (), Self::Error> {
        Box::pin(async move { self.post(context).await })
    }

    fn notify_summary<'a>(&'a self, report: &'a RunReport) -> ProviderFuture<'a, (), Self::Error> {
        Box::pin(async move { self.post(&report.render_summary()).await })
    }
}
