//! Power management and readiness polling for Scaleway instances.

use tokio::time::sleep;
use tracing::debug;

use crate::compute::{ComputeResource, PowerState, ResourceSelector};

use super::{ScalewayProvider, ScalewayProviderError};

/// Instance state as reported by the Instances API.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct InstanceSnapshot {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) tags: Vec<String>,
    pub(crate) state: String,
    pub(crate) allowed_actions: Vec<String>,
}

/// Next move when an instance must be brought up.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum PowerOnStep {
    /// Already running or booting.
    Skip,
    /// Still powering off; `poweron` is refused until it settles.
    AwaitStop,
    /// Send `poweron`.
    PowerOn,
    /// The provider offers no way to power the instance on.
    NotAllowed,
}

impl InstanceSnapshot {
    pub(crate) fn power_on_step(&self) -> PowerOnStep {
        match self.state.as_str() {
            "running" | "starting" => PowerOnStep::Skip,
            "stopping" => PowerOnStep::AwaitStop,
            _ if self.allows("poweron") => PowerOnStep::PowerOn,
            _ => PowerOnStep::NotAllowed,
        }
    }

    pub(crate) fn allows(&self, action: &str) -> bool {
        self.allowed_actions.iter().any(|allowed| allowed == action)
    }

    pub(crate) fn into_resource(self, zone: &str) -> ComputeResource {
        ComputeResource {
            state: PowerState::from_provider(&self.state),
            id: self.id,
            zone: zone.to_owned(),
            name: self.name,
            tags: self.tags,
        }
    }
}

impl ScalewayProvider {
    pub(super) async fn list_snapshots(&self) -> Result<Vec<InstanceSnapshot>, ScalewayProviderError> {
        let servers = self
            .api
            .list_instances(&self.zone)
            .per_page(100)
            .run_async()
            .await?;

        Ok(servers
            .into_iter()
            .map(|server| InstanceSnapshot {
                id: server.id,
                name: server.name,
                tags: server.tags,
                state: server.state,
                allowed_actions: server.allowed_actions,
            })
            .collect())
    }

    pub(super) async fn list_tagged(
        &self,
        selector: &ResourceSelector,
    ) -> Result<Vec<ComputeResource>, ScalewayProviderError> {
        Ok(self
            .list_snapshots()
            .await?
            .into_iter()
            .map(|snapshot| snapshot.into_resource(&self.zone))
            .filter(|resource| selector.matches(resource))
            .collect())
    }

    pub(super) async fn fetch_instance(
        &self,
        instance_id: &str,
    ) -> Result<Option<InstanceSnapshot>, ScalewayProviderError> {
        let mut servers = self
            .api
            .list_instances(&self.zone)
            .servers(instance_id)
            .per_page(1)
            .run_async()
            .await?;

        Ok(servers.pop().map(|server| InstanceSnapshot {
            id: server.id,
            name: server.name,
            tags: server.tags,
            state: server.state,
            allowed_actions: server.allowed_actions,
        }))
    }

    pub(super) async fn require_instance(
        &self,
        instance_id: &str,
    ) -> Result<InstanceSnapshot, ScalewayProviderError> {
        self.fetch_instance(instance_id)
            .await?
            .ok_or_else(|| ScalewayProviderError::Vanished {
                instance_id: instance_id.to_owned(),
            })
    }

    /// Powers the instance on unless it is already up. An instance that is
    /// still stopping is polled until it settles first.
    pub(super) async fn power_on_if_needed(
        &self,
        snapshot: &InstanceSnapshot,
    ) -> Result<(), ScalewayProviderError> {
        let mut current = snapshot.clone();
        loop {
            match current.power_on_step() {
                PowerOnStep::Skip => return Ok(()),
                PowerOnStep::AwaitStop => {
                    debug!(instance = %current.id, "waiting for instance to stop before powering on");
                    sleep(self.poll_interval).await;
                    current = self.require_instance(&current.id).await?;
                }
                PowerOnStep::PowerOn => {
                    self.api
                        .perform_instance_action_async(&self.zone, &current.id, "poweron")
                        .await?;
                    return Ok(());
                }
                PowerOnStep::NotAllowed => {
                    return Err(ScalewayProviderError::PowerOnNotAllowed {
                        instance_id: current.id,
                        state: current.state,
                    });
                }
            }
        }
    }

    pub(super) async fn power_off_if_needed(
        &self,
        snapshot: &InstanceSnapshot,
    ) -> Result<(), ScalewayProviderError> {
        if matches!(
            snapshot.state.as_str(),
            "stopped" | "stopped in place" | "stopping"
        ) {
            debug!(instance = %snapshot.id, state = %snapshot.state, "instance already powering off");
            return Ok(());
        }

        if snapshot.allows("poweroff") {
            self.api
                .perform_instance_action_async(&self.zone, &snapshot.id, "poweroff")
                .await?;
            return Ok(());
        }

        Err(ScalewayProviderError::PowerOffNotAllowed {
            instance_id: snapshot.id.clone(),
            state: snapshot.state.clone(),
        })
    }

    /// Polls until the instance reports `running`. There is no local
    /// deadline; boot time is bounded by the provider.
    pub(super) async fn wait_for_running(
        &self,
        instance_id: &str,
    ) -> Result<ComputeResource, ScalewayProviderError> {
        loop {
            let snapshot = self.require_instance(instance_id).await?;
            if snapshot.state == "running" {
                return Ok(snapshot.into_resource(&self.zone));
            }

            debug!(instance = %instance_id, state = %snapshot.state, "waiting for instance to run");
            sleep(self.poll_interval).await;
        }
    }
}
