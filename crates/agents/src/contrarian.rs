//! Contrarian analyst: buys fear, sells greed.

use crate::features::AgentFeatures;
use crate::llm::{into_agent_verdict, CompletionClient, RESPONSE_FORMAT};
use crate::{Agent, AgentInputs};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use stocksense_core::{AgentVerdict, SignalThresholds};

const SYSTEM_PROMPT: &str = r#"You are a contrarian value investor who profits by going against the crowd.

Your core philosophy:
1. Buy when others are fearful: negative sentiment together with oversold RSI (< 30).
2. Sell when others are greedy: extreme positive sentiment together with overbought RSI (> 70).
3. Look for value in fear, recognize danger in euphoria.
4. The crowd is usually wrong at extremes; without an extreme to exploit, hold.

"#;

pub struct ContrarianAgent {
    name: String,
    weight: f64,
    client: Arc<dyn CompletionClient>,
    thresholds: SignalThresholds,
}

impl ContrarianAgent {
    #[must_use]
    pub fn new(
        client: Arc<dyn CompletionClient>,
        weight: f64,
        thresholds: SignalThresholds,
    ) -> Self {
        Self {
            name: "contrarian".to_string(),
            weight,
            client,
            thresholds,
        }
    }

    fn build_prompt(inputs: &AgentInputs, features: &AgentFeatures) -> String {
        let mut lines = vec![
            format!("Analyze {} from a CONTRARIAN perspective.", inputs.ticker),
            String::new(),
            format!("Current price: {}", features.price_label()),
            format!("RSI (14d): {:.1}", features.rsi),
        ];
        if features.rsi < 30.0 {
            lines.push("  -> OVERSOLD, a contrarian bullish condition".to_string());
        } else if features.rsi > 70.0 {
            lines.push("  -> OVERBOUGHT, a contrarian bearish condition".to_string());
        }
        lines.push(format!(
            "Combined sentiment: {:+.3} (crowd mood)",
            features.sentiment
        ));
        if features.sentiment <= -0.5 {
            lines.push("  -> EXTREME FEAR, a contrarian buy condition".to_string());
        } else if features.sentiment >= 0.5 {
            lines.push("  -> EXTREME GREED, a contrarian sell condition".to_string());
        }
        lines.push(format!("Total mentions: {}", features.total_mentions));
        lines.push(String::new());
        lines.push(
            "Is the crowd at an emotional extreme you can trade against? Decide.".to_string(),
        );
        lines.join("\n")
    }
}

#[async_trait]
impl Agent for ContrarianAgent {
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
        data_used.insert("rsi".to_string(), features.rsi);
        data_used.insert("sentiment".to_string(), features.sentiment);
        data_used.insert("mentions".to_string(), f64::from(features.total_mentions));

        let result = self.client.complete(&system, &prompt).await;
        into_agent_verdict(&self.name, "Contrarian", result, data_used, &self.thresholds)
    }
}
