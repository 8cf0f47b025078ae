//! Deterministic rule-based predictor: the always-available baseline agent.
//!
//! Blends an RSI mean-reversion score, short-horizon momentum, and sentiment
//! into a weighted total, then maps it through the shared signal thresholds.

use crate::features::AgentFeatures;
use crate::{Agent, AgentInputs};
use async_trait::async_trait;
use std::collections::BTreeMap;
use stocksense_core::{AgentVerdict, SignalThresholds};

const RSI_WEIGHT: f64 = 0.4;
const MOMENTUM_WEIGHT: f64 = 0.3;
const SENTIMENT_WEIGHT: f64 = 0.3;

const RSI_OVERSOLD: f64 = 30.0;
const RSI_OVERBOUGHT: f64 = 70.0;

pub struct PredictorAgent {
    name: String,
    weight: f64,
    thresholds: SignalThresholds,
}

impl PredictorAgent {
    #[must_use]
    pub fn new(weight: f64, thresholds: SignalThresholds) -> Self {
        Self {
            name: "predictor".to_string(),
            weight,
            thresholds,
        }
    }

    /// Mean-reversion score from RSI: deeply oversold approaches +1, deeply
    /// overbought approaches -1, the middle zone leans gently against the
    /// prevailing direction.
    fn rsi_score(rsi: f64) -> f64 {
        if rsi <= RSI_OVERSOLD {
            (0.6 + (RSI_OVERSOLD - rsi) / RSI_OVERSOLD * 0.4).min(1.0)
        } else if rsi >= RSI_OVERBOUGHT {
            (-0.6 - (rsi - RSI_OVERBOUGHT) / (100.0 - RSI_OVERBOUGHT) * 0.4).max(-1.0)
        } else {
            (50.0 - rsi) / 50.0 * 0.5
        }
    }

    /// Momentum score: ±10% over 7 days saturates at ±1.
    fn momentum_score(change_7d: f64) -> f64 {
        (change_7d / 10.0).clamp(-1.0, 1.0)
    }

    /// Confidence from factor agreement and data coverage.
    fn confidence(factors: &BTreeMap<String, f64>) -> f64 {
        let active: Vec<f64> = factors.values().copied().filter(|f| f.abs() > 0.1).collect();
        if active.is_empty() {
            return 0.0;
        }
        let positive = active.iter().filter(|f| **f > 0.0).count();
        let negative = active.len() - positive;
        let agreement = positive.max(negative) as f64 / active.len() as f64;
        let coverage = active.len() as f64 / factors.len() as f64;
        (agreement * 0.6 + coverage * 0.4).min(1.0)
    }
}

#[async_trait]
impl Agent for PredictorAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    async fn analyze(&self, inputs: &AgentInputs) -> AgentVerdict {
        let features = AgentFeatures::extract(&inputs.market, &inputs.sentiment);

        let rsi_score = Self::rsi_score(features.rsi);
        let momentum_score = Self::momentum_score(features.momentum_7d);
        let sentiment_score = features.sentiment;

        let mut factors = BTreeMap::new();
        factors.insert("rsi_signal".to_string(), rsi_score);
        factors.insert("momentum_signal".to_string(), momentum_score);
        factors.insert("sentiment_signal".to_string(), sentiment_score);

        let total = rsi_score * RSI_WEIGHT
            + momentum_score * MOMENTUM_WEIGHT
            + sentiment_score * SENTIMENT_WEIGHT;
        let confidence = Self::confidence(&factors);

        let mut reasons = Vec::new();
        if features.rsi <= RSI_OVERSOLD {
            reasons.push(format!("RSI {:.0} oversold, reversal likely", features.rsi));
        } else if features.rsi >= RSI_OVERBOUGHT {
            reasons.push(format!("RSI {:.0} overbought, correction risk", features.rsi));
        } else {
            reasons.push(format!("RSI {:.0} neutral", features.rsi));
        }
        if momentum_score.abs() > 0.1 {
            reasons.push(format!("7d momentum {:+.1}%", features.momentum_7d));
        }
        if features.sentiment_available {
            reasons.push(format!("sentiment {:+.2}", sentiment_score));
        }

        AgentVerdict::from_score(
            &self.name,
            total,
            confidence,
            format!("[Technical] {}", reasons.join("; ")),
            factors,
            &self.thresholds,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use stocksense_core::{
        MarketSnapshot, SentimentSnapshot, SignalLevel, SocialSentiment, Ticker,
    };

    fn inputs(rsi: Option<f64>, change_7d: Option<f64>, sentiment: Option<f64>) -> AgentInputs {
        let ticker = Ticker::parse("NVDA").unwrap();
        let mut market = MarketSnapshot::empty(ticker.clone(), Utc::now());
        market.current_price = Some(dec!(150.00));
        if let Some(rsi) = rsi {
            market.indicators.insert("rsi".into(), rsi);
        }
        if let Some(change) = change_7d {
            market.indicators.insert("price_change_7d".into(), change);
        }
        let sentiment = match sentiment {
            Some(score) => SentimentSnapshot::combine(
                ticker.clone(),
                Utc::now(),
                SocialSentiment {
                    mentions: 25,
                    score,
                    available: true,
                },
                Default::default(),
            ),
            None => SentimentSnapshot::unavailable(ticker.clone(), Utc::now()),
        };
        AgentInputs {
            ticker,
            market,
            sentiment,
        }
    }

    #[tokio::test]
    async fn oversold_with_fear_is_a_buy() {
        let agent = PredictorAgent::new(1.0, SignalThresholds::default());
        let verdict = agent.analyze(&inputs(Some(22.0), Some(-2.0), Some(-0.3))).await;

        assert!(!verdict.failed);
        // RSI score strongly positive, momentum mildly negative, sentiment
        // negative: mean reversion should still dominate into a buy zone.
        assert!(verdict.raw_score > 0.0, "score {}", verdict.raw_score);
        assert!(verdict.confidence > 0.0);
        assert_eq!(verdict.agent_name, "predictor");
    }

    #[tokio::test]
    async fn overbought_with_greed_is_a_sell() {
        let agent = PredictorAgent::new(1.0, SignalThresholds::default());
        let verdict = agent.analyze(&inputs(Some(82.0), Some(2.0), Some(0.2))).await;
        assert!(verdict.raw_score < -0.1, "score {}", verdict.raw_score);
        assert!(matches!(
            verdict.signal,
            SignalLevel::Sell | SignalLevel::StrongSell
        ));
    }

    #[tokio::test]
    async fn empty_inputs_hold_with_defaults() {
        let agent = PredictorAgent::new(1.0, SignalThresholds::default());
        let verdict = agent.analyze(&inputs(None, None, None)).await;

        // RSI defaults to 50 (score 0), momentum 0, sentiment 0.
        assert!(!verdict.failed);
        assert_eq!(verdict.raw_score, 0.0);
        assert_eq!(verdict.signal, SignalLevel::Hold);
        assert_eq!(verdict.confidence, 0.0);
    }

    #[tokio::test]
    async fn factors_are_recorded_for_audit() {
        let agent = PredictorAgent::new(1.0, SignalThresholds::default());
        let verdict = agent.analyze(&inputs(Some(25.0), Some(8.0), Some(0.4))).await;
        assert!(verdict.data_used.contains_key("rsi_signal"));
        assert!(verdict.data_used.contains_key("momentum_signal"));
        assert!(verdict.data_used.contains_key("sentiment_signal"));
        assert!(verdict.reasoning.starts_with("[Technical]"));
    }

    #[test]
    fn rsi_score_shape() {
        assert!(PredictorAgent::rsi_score(10.0) > PredictorAgent::rsi_score(29.0));
        assert!((PredictorAgent::rsi_score(0.0) - 1.0).abs() < f64::EPSILON);
        assert!((PredictorAgent::rsi_score(100.0) + 1.0).abs() < f64::EPSILON);
        assert_eq!(PredictorAgent::rsi_score(50.0), 0.0);
        // Middle zone leans against the move.
        assert!(PredictorAgent::rsi_score(60.0) < 0.0);
        assert!(PredictorAgent::rsi_score(40.0) > 0.0);
    }

    #[test]
    fn confidence_rises_with_agreement() {
        let mut aligned = BTreeMap::new();
        aligned.insert("a".to_string(), 0.5);
        aligned.insert("b".to_string(), 0.4);
        aligned.insert("c".to_string(), 0.3);

        let mut split = BTreeMap::new();
        split.insert("a".to_string(), 0.5);
        split.insert("b".to_string(), -0.4);
        split.insert("c".to_string(), 0.3);

        assert!(PredictorAgent::confidence(&aligned) > PredictorAgent::confidence(&split));
    }
}
