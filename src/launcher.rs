//! Submits the configured transfer tasks.

use thiserror::Error;
use tracing::info;

use crate::manifest::StreamSpec;
use crate::transfer::TransferService;

/// A start request failed part way through the stream list.
#[derive(Debug, Error)]
#[error("failed to start stream {stream}: {source}")]
pub struct LaunchError<E>
where
    E: std::error::Error + 'static,
{
    /// Stream whose start request failed.
    pub stream: String,
    /// Streams started before the failure, in launch order.
    pub started: Vec<String>,
    /// Transfer service error.
    #[source]
    pub source: E,
}

/// Execution started for a stream.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LaunchedStream {
    /// Stream name.
    pub stream: String,
    /// Identifier of the new execution.
    pub execution_arn: String,
}

/// Starts one execution per configured stream.
#[derive(Debug)]
pub struct TransferLauncher<'a, T> {
    transfer: &'a T,
}

impl<'a, T: TransferService> TransferLauncher<'a, T> {
    /// Wraps `transfer`.
    #[must_use]
    pub const fn new(transfer: &'a T) -> Self {
        Self { transfer }
    }

    /// Starts every stream in configured order. Stops at the first error;
    /// executions already started are left running.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError`] naming the failed stream and those started
    /// before it.
    pub async fn start_all(
        &self,
        streams: &[StreamSpec],
    ) -> Result<Vec<LaunchedStream>, LaunchError<T::Error>> {
        let mut launched = Vec::with_capacity(streams.len());
        for stream in streams {
            match self.transfer.start_task_execution(&stream.task_arn).await {
                Ok(execution_arn) => {
                    info!(stream = %stream.name, execution = %execution_arn, "started transfer");
                    launched.push(LaunchedStream {
                        stream: stream.name.clone(),
                        execution_arn,
                    });
                }
                Err(source) => {
                    return Err(LaunchError {
                        stream: stream.name.clone(),
                        started: launched.into_iter().map(|entry| entry.stream).collect(),
                        source,
                    });
                }
            }
        }
        Ok(launched)
    }
}
