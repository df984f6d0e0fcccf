//! Compute provider abstraction for the VMs hosting the sync agents.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// Selects the compute resources that belong to a migration.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResourceSelector {
    /// Category tag carried by every resource taking part in the run.
    pub category_tag: String,
}

impl ResourceSelector {
    /// Creates a selector for resources tagged with `category_tag`.
    #[must_use]
    pub fn tagged(category_tag: impl Into<String>) -> Self {
        Self {
            category_tag: category_tag.into(),
        }
    }

    /// Returns `true` when `resource` carries the category tag.
    #[must_use]
    pub fn matches(&self, resource: &ComputeResource) -> bool {
        resource.has_tag(&self.category_tag)
    }
}

/// Power state reported by the provider.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PowerState {
    /// Powered off.
    Stopped,
    /// Boot in progress.
    Starting,
    /// Powered on.
    Running,
    /// Shutdown in progress.
    Stopping,
    /// Any state the orchestrator has no rule for (for example `locked`).
    Other(String),
}

impl PowerState {
    /// Maps a provider state string onto a [`PowerState`].
    #[must_use]
    pub fn from_provider(raw: &str) -> Self {
        match raw {
            "running" => Self::Running,
            "starting" => Self::Starting,
            "stopping" => Self::Stopping,
            "stopped" | "stopped in place" => Self::Stopped,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => f.write_str("stopped"),
            Self::Starting => f.write_str("starting"),
            Self::Running => f.write_str("running"),
            Self::Stopping => f.write_str("stopping"),
            Self::Other(raw) => f.write_str(raw),
        }
    }
}

/// Snapshot of a compute resource as last reported by the provider.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ComputeResource {
    /// Provider specific identifier.
    pub id: String,
    /// Zone hosting the resource.
    pub zone: String,
    /// Display name.
    pub name: String,
    /// Tags attached to the resource, including the category marker and the
    /// role label.
    pub tags: Vec<String>,
    /// Power state at the time of the snapshot.
    pub state: PowerState,
}

impl ComputeResource {
    /// Returns `true` when the resource carries `tag`.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|candidate| candidate == tag)
    }

    /// Returns `true` when the provider reports the resource as running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state == PowerState::Running
    }
}

/// Future returned by provider operations.
pub type ProviderFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Minimal interface implemented by compute providers.
pub trait ComputeProvider: Send + Sync {
    /// Provider specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Lists every resource matching `selector`.
    fn list_resources<'a>(
        &'a self,
        selector: &'a ResourceSelector,
    ) -> ProviderFuture<'a, Vec<ComputeResource>, Self::Error>;

    /// Requests that a stopped resource powers on.
    fn start<'a>(&'a self, resource: &'a ComputeResource) -> ProviderFuture<'a, (), Self::Error>;

    /// Blocks until the resource reports `running` and returns its refreshed
    /// snapshot.
    fn wait_until_running<'a>(
        &'a self,
        resource: &'a ComputeResource,
    ) -> ProviderFuture<'a, ComputeResource, Self::Error>;

    /// Requests a power off without waiting for it to complete.
    fn stop<'a>(&'a self, resource: &'a ComputeResource) -> ProviderFuture<'a, (), Self::Error>;
}
