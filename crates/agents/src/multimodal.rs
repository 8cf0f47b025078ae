//! Multi-modal synthesis analyst: numeric features plus recent headlines.

use crate::features::AgentFeatures;
use crate::llm::{into_agent_verdict, CompletionClient, RESPONSE_FORMAT};
use crate::{Agent, AgentInputs};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use stocksense_core::{AgentVerdict, SignalThresholds};

const SYSTEM_PROMPT: &str = r#"You are a multi-modal analyst synthesizing technical and sentiment evidence into one view.

Your synthesis approach:
1. Technical: RSI and momentum describe what price is doing.
2. Sentiment: news tone and social mood describe what the crowd believes.
3. Confidence is highest when the two perspectives ALIGN; when they conflict, reduce confidence and lean HOLD.

"#;

pub struct MultiModalAgent {
    name: String,
    weight: f64,
    client: Arc<dyn CompletionClient>,
    thresholds: SignalThresholds,
}

impl MultiModalAgent {
    #[must_use]
    pub fn new(
        client: Arc<dyn CompletionClient>,
        weight: f64,
        thresholds: SignalThresholds,
    ) -> Self {
        Self {
            name: "multimodal".to_string(),
            weight,
            client,
            thresholds,
        }
    }

    fn build_prompt(inputs: &AgentInputs, features: &AgentFeatures) -> String {
        let mut lines = vec![
            format!("Synthesize all evidence for {}.", inputs.ticker),
            String::new(),
            format!("Current price: {}", features.price_label()),
            format!("RSI (14d): {:.1}", features.rsi),
            format!("7-day momentum: {:+.2}%", features.momentum_7d),
            format!("Volume trend: {}", features.volume_label()),
            format!(
                "Combined sentiment: {:+.3} across {} mentions",
                features.sentiment, features.total_mentions
            ),
        ];
        if features.headlines.is_empty() {
            lines.push("Recent headlines: none available".to_string());
        } else {
            lines.push("Recent headlines:".to_string());
            for headline in &features.headlines {
                lines.push(format!("  - {headline}"));
            }
        }
        lines.push(String::new());
        lines.push("Do the perspectives align? Give your synthesized call.".to_string());
        lines.join("\n")
    }
}

#[async_trait]
impl Agent for MultiModalAgent {
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
        data_used.insert("momentum_7d".to_string(), features.momentum_7d);
        data_used.insert("sentiment".to_string(), features.sentiment);
        data_used.insert(
            "headline_count".to_string(),
            features.headlines.len() as f64,
        );

        let result = self.client.complete(&system, &prompt).await;
        into_agent_verdict(&self.name, "MultiModal", result, data_used, &self.thresholds)
    }
}
