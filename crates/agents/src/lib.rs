//! The analyst panel: four independent agents turning one snapshot into one
//! verdict each.
//!
//! Agents share no mutable state and may run concurrently. An agent never
//! lets an error escape `analyze`; every internal failure becomes a
//! `failed = true` HOLD verdict.

pub mod contrarian;
pub mod features;
pub mod growth;
pub mod llm;
pub mod multimodal;
pub mod panel;
pub mod predictor;

use async_trait::async_trait;
use stocksense_core::{AgentVerdict, MarketSnapshot, SentimentSnapshot, Ticker};

pub use contrarian::ContrarianAgent;
pub use features::AgentFeatures;
pub use growth::GrowthAgent;
pub use multimodal::MultiModalAgent;
pub use panel::AgentPanel;
pub use predictor::PredictorAgent;

/// Inputs shared by every agent for one request.
#[derive(Debug, Clone)]
pub struct AgentInputs {
    pub ticker: Ticker,
    pub market: MarketSnapshot,
    pub sentiment: SentimentSnapshot,
}

/// The capability every panel member satisfies.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Unique name within the panel.
    fn name(&self) -> &str;

    /// Weight of this agent's vote in the consensus.
    fn weight(&self) -> f64 {
        1.0
    }

    /// Produces exactly one verdict. Must not panic and must not error out
    /// of the boundary; failures collapse to a failed HOLD.
    async fn analyze(&self, inputs: &AgentInputs) -> AgentVerdict;
}
