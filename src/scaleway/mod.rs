//! Scaleway implementation of the compute provider.
//!
//! Sync agent VMs are plain Scaleway instances. Membership in a migration is
//! expressed with tags: the category tag selects the fleet and a role-label
//! tag ties each instance to one stream.

mod error;
mod lifecycle;

use std::time::Duration;

use scaleway_rs::ScalewayApi;

use crate::compute::{ComputeProvider, ComputeResource, ProviderFuture, ResourceSelector};
use crate::config::ScalewayConfig;

pub use error::ScalewayProviderError;

const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Compute provider backed by the Scaleway Instances API.
#[derive(Clone)]
pub struct ScalewayProvider {
    api: ScalewayApi,
    zone: String,
    poll_interval: Duration,
}

impl ScalewayProvider {
    /// Constructs a new provider from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ScalewayProviderError::Config`] when the provided
    /// configuration fails validation.
    pub fn new(config: &ScalewayConfig) -> Result<Self, ScalewayProviderError> {
        config.validate()?;
        Ok(Self {
            api: ScalewayApi::new(&config.secret_key),
            zone: config.default_zone.trim().to_owned(),
            poll_interval: POLL_INTERVAL,
        })
    }

    /// Overrides the interval between readiness polls.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Zone queried by this provider.
    #[must_use]
    pub fn zone(&self) -> &str {
        &self.zone
    }
}

impl ComputeProvider for ScalewayProvider {
    type Error = ScalewayProviderError;

    fn list_resources<'a>(
        &'a self,
        selector: &'a ResourceSelector,
    ) -> ProviderFuture<'a, Vec<ComputeResource>, Self::Error> {
        Box::pin(async move { self.list_tagged(selector).await })
    }

    fn start<'a>(&'a self, resource: &'a ComputeResource) -> ProviderFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let snapshot = self.require_instance(&resource.id).await?;
            self.power_on_if_needed(&snapshot).await
        })
    }

    fn wait_until_running<'a>(
        &'a self,
        resource: &'a ComputeResource,
    ) -> ProviderFuture<'a, ComputeResource, Self::Error> {
        Box::pin(async move { self.wait_for_running(&resource.id).await })
    }

    fn stop<'a>(&'a self, resource: &'a ComputeResource) -> ProviderFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let snapshot = self.require_instance(&resource.id).await?;
            self.power_off_if_needed(&snapshot).await
        })
    }
}
