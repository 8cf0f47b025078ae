//! Growth analyst: momentum and trend strength.

use crate::features::AgentFeatures;
use crate::llm::{into_agent_verdict, CompletionClient, RESPONSE_FORMAT};
use crate::{Agent, AgentInputs};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use stocksense_core::{AgentVerdict, SignalThresholds};

const SYSTEM_PROMPT: &str = r#"You are a growth-focused stock analyst who identifies momentum opportunities.

Your growth philosophy:
1. Buy strong momentum (over +10% on the month) confirmed by positive sentiment.
2. Avoid negative momentum (below -5% on the month) even if the stock looks cheap.
3. Never buy overbought conditions (RSI > 75) without volume confirmation.
4. Prefer rising volume together with positive sentiment.

"#;

pub struct GrowthAgent {
    name: String,
    weight: f64,
    client: Arc<dyn CompletionClient>,
    thresholds: SignalThresholds,
}

impl GrowthAgent {
    #[must_use]
    pub fn new(
        client: Arc<dyn CompletionClient>,
        weight: f64,
        thresholds: SignalThresholds,
    ) -> Self {
        Self {
            name: "growth".to_string(),
            weight,
            client,
            thresholds,
        }
    }

    fn build_prompt(inputs: &AgentInputs, features: &AgentFeatures) -> String {
        [
            format!("Analyze {} for GROWTH and MOMENTUM.", inputs.ticker),
            String::new(),
            format!("Current price: {}", features.price_label()),
            format!("30-day momentum: {:+.2}%", features.momentum_30d),
            format!("7-day momentum: {:+.2}%", features.momentum_7d),
            format!("RSI (14d): {:.1}", features.rsi),
            format!("Volume trend: {}", features.volume_label()),
            format!("Combined sentiment: {:+.3}", features.sentiment),
            String::new(),
            "Is this a momentum leader worth owning right now? Decide.".to_string(),
        ]
        .join("\n")
    }
}

#[async_trait]
impl Agent for GrowthAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    async fn analyze(&self, inputs: &AgentInputs) -> AgentVerdict {
        let features = AgentFeatures::extract(&inputs.market, &inputs.sentiment);
        let prompt = Self::build_prompt(inputs, &features);
        let system = format!("{SYSTEM_PROMPT}{RESPONSE_FORMAT}");

        let mut data_used = BTreeMap::new();
        data_used.insert("momentum_30d".to_string(), features.momentum_30d);
        data_used.insert("momentum_7d".to_string(), features.momentum_7d);
        data_used.insert("rsi".to_string(), features.rsi);
        data_used.insert("sentiment".to_string(), features.sentiment);

        let result = self.client.complete(&system, &prompt).await;
        into_agent_verdict(&self.name, "Growth", result, data_used, &self.thresholds)
    }
}
