//! The agent panel: concurrent fan-out with a shared deadline.

use crate::{Agent, AgentInputs};
use std::sync::Arc;
use std::time::Duration;
use stocksense_core::AgentVerdict;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tracing::{info, warn};

/// Runs every registered agent concurrently and collects one verdict per
/// agent, in registration order regardless of completion order. Agents that
/// miss the shared deadline (or die) contribute failed HOLD verdicts.
pub struct AgentPanel {
    agents: Vec<Arc<dyn Agent>>,
    deadline: Duration,
}

impl AgentPanel {
    /// Builds a panel. Duplicate agent names are rejected: verdict audit
    /// records are keyed by name.
    ///
    /// # Panics
    /// Panics if two agents share a name; panels are assembled once at
    /// startup from configuration.
    #[must_use]
    pub fn new(agents: Vec<Arc<dyn Agent>>, deadline: Duration) -> Self {
        let mut names: Vec<&str> = agents.iter().map(|a| a.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(
            names.len(),
            agents.len(),
            "agent names must be unique within a panel"
        );
        Self { agents, deadline }
    }

    /// Registered agents, in panel order.
    #[must_use]
    pub fn agents(&self) -> &[Arc<dyn Agent>] {
        &self.agents
    }

    /// Consensus weight for a named agent; 0 for unknown names.
    #[must_use]
    pub fn weight_of(&self, agent_name: &str) -> f64 {
        self.agents
            .iter()
            .find(|a| a.name() == agent_name)
            .map_or(0.0, |a| a.weight())
    }

    /// Runs the panel against one set of inputs under its configured
    /// deadline.
    pub async fn run(&self, inputs: &AgentInputs) -> Vec<AgentVerdict> {
        self.run_within(inputs, self.deadline).await
    }

    /// Runs the panel with its deadline capped at `remaining` — the
    /// enclosing request budget bounds the panel budget. Agents still
    /// running when the effective deadline elapses contribute failed HOLDs;
    /// completed agents are kept either way.
    pub async fn run_within(
        &self,
        inputs: &AgentInputs,
        remaining: Duration,
    ) -> Vec<AgentVerdict> {
        let effective = self.deadline.min(remaining);
        let shared = Arc::new(inputs.clone());
        let mut results: Vec<Option<AgentVerdict>> = vec![None; self.agents.len()];

        let mut set = JoinSet::new();
        for (index, agent) in self.agents.iter().enumerate() {
            let agent = Arc::clone(agent);
            let inputs = Arc::clone(&shared);
            set.spawn(async move { (index, agent.analyze(&inputs).await) });
        }

        let deadline = Instant::now() + effective;
        loop {
            match timeout_at(deadline, set.join_next()).await {
                Ok(Some(Ok((index, verdict)))) => {
                    results[index] = Some(verdict);
                }
                Ok(Some(Err(join_err))) => {
                    // A dead task has no index; its slot stays empty and is
                    // filled with a failed verdict below.
                    warn!(error = %join_err, "agent task died");
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(deadline = ?effective, "panel deadline elapsed");
                    set.abort_all();
                    break;
                }
            }
        }

        let verdicts: Vec<AgentVerdict> = results
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| {
                    AgentVerdict::failed(
                        self.agents[index].name(),
                        "agent did not complete before the panel deadline",
                    )
                })
            })
            .collect();

        let failed = verdicts.iter().filter(|v| v.failed).count();
        info!(
            ticker = %inputs.ticker,
            agents = verdicts.len(),
            failed,
            "panel complete"
        );
        verdicts
    }
}
