//! Blocks until every registered sync agent reports online.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use crate::transfer::{SyncAgent, TransferService};

/// Returns `true` when no agent in `agents` is offline.
///
/// The check looks at one roster snapshot only. An empty roster passes.
#[must_use]
pub fn all_online(agents: &[SyncAgent]) -> bool {
    agents.iter().all(SyncAgent::is_online)
}

/// Polls the agent roster until a single snapshot is fully online.
#[derive(Debug)]
pub struct AgentHealthGate<'a, T> {
    transfer: &'a T,
}

impl<'a, T: TransferService> AgentHealthGate<'a, T> {
    /// Wraps `transfer`.
    #[must_use]
    pub const fn new(transfer: &'a T) -> Self {
        Self { transfer }
    }

    /// Lists agents until one listing shows every agent online, sleeping
    /// `poll_interval` between listings. Returns the number of listings
    /// performed.
    ///
    /// There is no iteration cap; a permanently offline agent blocks the run.
    ///
    /// # Errors
    ///
    /// Returns the transfer service error from the first failed listing.
    pub async fn wait_until_all_online(&self, poll_interval: Duration) -> Result<u32, T::Error> {
        let mut polls = 0_u32;
        loop {
            let agents = self.transfer.list_agents().await?;
            polls = polls.saturating_add(1);

            if all_online(&agents) {
                if agents.is_empty() {
                    warn!("no sync agents registered; continuing");
                }
                info!(agents = agents.len(), polls, "all sync agents online");
                return Ok(polls);
            }

            let offline = agents.iter().filter(|agent| !agent.is_online()).count();
            info!(
                offline,
                total = agents.len(),
                "waiting for sync agents to come online"
            );
            sleep(poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedTransferService, agent};
    use rstest::rstest;

    #[rstest]
    #[case::empty(&[], true)]
    #[case::all_online(&[("a", true), ("b", true)], true)]
    #[case::one_offline(&[("a", true), ("b", false)], false)]
    fn all_online_reflects_the_snapshot(#[case] roster: &[(&str, bool)], #[case] expected: bool) {
        let agents = roster
            .iter()
            .map(|(name, online)| agent(name, *online))
            .collect::<Vec<_>>();
        assert_eq!(all_online(&agents), expected);
    }

    #[tokio::test(start_paused = true)]
    async fn healthy_first_poll_returns_without_sleeping() {
        let transfer = ScriptedTransferService::new();
        transfer.push_agents(vec![agent("a", true), agent("b", true)]);
        let started = tokio::time::Instant::now();

        let polls = AgentHealthGate::new(&transfer)
            .wait_until_all_online(Duration::from_secs(1))
            .await
            .expect("health gate should pass");

        assert_eq!(polls, 1);
        assert_eq!(transfer.agent_list_calls(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn flapping_agents_never_pass_early() {
        let transfer = ScriptedTransferService::new();
        transfer.push_agents(vec![agent("a", true), agent("b", false)]);
        transfer.push_agents(vec![agent("a", false), agent("b", true)]);
        transfer.push_agents(vec![agent("a", true), agent("b", false)]);
        transfer.push_agents(vec![agent("a", true), agent("b", true)]);

        let polls = AgentHealthGate::new(&transfer)
            .wait_until_all_online(Duration::from_secs(1))
            .await
            .expect("health gate should pass");

        assert_eq!(polls, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn roster_growth_requires_the_new_agent_online() {
        let transfer = ScriptedTransferService::new();
        transfer.push_agents(vec![agent("a", false)]);
        transfer.push_agents(vec![agent("a", true), agent("b", false)]);
        transfer.push_agents(vec![agent("a", true), agent("b", true)]);

        let polls = AgentHealthGate::new(&transfer)
            .wait_until_all_online(Duration::from_secs(1))
            .await
            .expect("health gate should pass");

        assert_eq!(polls, 3);
        assert_eq!(transfer.agent_list_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn listing_error_is_returned() {
        let transfer = ScriptedTransferService::new();
        transfer.fail_agent_listing("throttled");

        let err = AgentHealthGate::new(&transfer)
            .wait_until_all_online(Duration::from_secs(1))
            .await
            .expect_err("listing should fail");

        assert_eq!(err.to_string(), "throttled");
    }
}
