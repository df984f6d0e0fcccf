//! Powers sync agent VMs on before a run and off once their stream is done.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{debug, info};

use crate::compute::{ComputeProvider, ComputeResource, PowerState, ResourceSelector};
use crate::manifest::StreamSpec;

/// Drives power state changes through a [`ComputeProvider`].
#[derive(Debug)]
pub struct ResourceProvisioner<'a, P> {
    provider: &'a P,
}

impl<'a, P: ComputeProvider> ResourceProvisioner<'a, P> {
    /// Wraps `provider`.
    #[must_use]
    pub const fn new(provider: &'a P) -> Self {
        Self { provider }
    }

    /// Powers on every resource matching `selector` and waits for each to
    /// report running.
    ///
    /// Start requests are issued for the whole set before waiting so the VMs
    /// boot side by side. Resources already `starting` receive no second
    /// request. The returned list holds every matched resource, including
    /// the ones that were already running, with refreshed state.
    ///
    /// # Errors
    ///
    /// Returns the provider error from the first failed listing, start, or
    /// wait call.
    pub async fn ensure_running(
        &self,
        selector: &ResourceSelector,
    ) -> Result<Vec<ComputeResource>, P::Error> {
        let resources = self.provider.list_resources(selector).await?;
        info!(
            tag = %selector.category_tag,
            count = resources.len(),
            "found compute resources"
        );

        for resource in &resources {
            match resource.state {
                PowerState::Running => {
                    debug!(resource = %resource.name, "already running");
                }
                PowerState::Starting => {
                    debug!(resource = %resource.name, "already starting");
                }
                _ => {
                    info!(resource = %resource.name, state = %resource.state, "starting resource");
                    self.provider.start(resource).await?;
                }
            }
        }

        let mut ready = Vec::with_capacity(resources.len());
        for resource in resources {
            if resource.is_running() {
                ready.push(resource);
                continue;
            }
            let refreshed = self.provider.wait_until_running(&resource).await?;
            info!(resource = %refreshed.name, "resource running");
            ready.push(refreshed);
        }
        Ok(ready)
    }

    /// Requests a power off without waiting for it to complete.
    ///
    /// # Errors
    ///
    /// Returns the provider error when the request is rejected.
    pub async fn stop(&self, resource: &ComputeResource) -> Result<(), P::Error> {
        info!(resource = %resource.name, "stopping resource");
        self.provider.stop(resource).await
    }
}

/// Errors raised while mapping streams onto compute resources.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ResourceIndexError {
    /// Raised when no resource carries the stream's role label.
    #[error("no compute resource is tagged {label} for stream {stream}")]
    Missing {
        /// Stream lacking a resource.
        stream: String,
        /// Role label that was searched for.
        label: String,
    },
    /// Raised when several resources carry the stream's role label.
    #[error("{count} compute resources are tagged {label} for stream {stream}")]
    Ambiguous {
        /// Stream with more than one candidate.
        stream: String,
        /// Role label that was searched for.
        label: String,
        /// Number of matching resources.
        count: usize,
    },
}

/// Stream name to compute resource mapping, resolved once per run.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ResourceIndex {
    by_stream: BTreeMap<String, ComputeResource>,
}

impl ResourceIndex {
    /// Resolves the single resource carrying each stream's role label.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceIndexError`] when a label matches no resource or
    /// more than one.
    pub fn build(
        resources: &[ComputeResource],
        streams: &[StreamSpec],
    ) -> Result<Self, ResourceIndexError> {
        let mut by_stream = BTreeMap::new();
        for stream in streams {
            let mut matches = resources
                .iter()
                .filter(|resource| resource.has_tag(&stream.resource_label));
            let Some(first) = matches.next() else {
                return Err(ResourceIndexError::Missing {
                    stream: stream.name.clone(),
                    label: stream.resource_label.clone(),
                });
            };
            let extra = matches.count();
            if extra > 0 {
                return Err(ResourceIndexError::Ambiguous {
                    stream: stream.name.clone(),
                    label: stream.resource_label.clone(),
                    count: extra + 1,
                });
            }
            by_stream.insert(stream.name.clone(), first.clone());
        }
        Ok(Self { by_stream })
    }

    /// Resource assigned to `stream`, if the stream is known.
    #[must_use]
    pub fn resource_for(&self, stream: &str) -> Option<&ComputeResource> {
        self.by_stream.get(stream)
    }
}
