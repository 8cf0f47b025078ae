//! LLM completion adapters and the strict verdict schema.
//!
//! All vendors sit behind [`CompletionClient`]; each adapter owns its own
//! circuit breaker and retry policy so one vendor being down never blocks
//! the others. Responses are normalised (whitespace and markdown fences
//! stripped) before JSON parsing; anything non-conforming collapses to a
//! failed verdict at the agent boundary.

pub mod anthropic;
pub mod gemini;
pub mod openai;

use async_trait::async_trait;
use serde::Deserialize;
use stocksense_aggregator::ProviderError;
use stocksense_core::Recommendation;

pub use anthropic::AnthropicClient;
pub use gemini::GeminiClient;
pub use openai::OpenAiClient;

/// A chat-completion vendor.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Vendor label for logs and breaker naming.
    fn vendor(&self) -> &str;

    /// Sends one system + user prompt pair and returns the raw response
    /// text. Retries and breaker bookkeeping happen inside the adapter.
    async fn complete(&self, system_prompt: &str, user_prompt: &str)
        -> Result<String, ProviderError>;
}

/// The only response shape accepted from any model.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmVerdict {
    pub recommendation: Recommendation,
    /// Conviction on the 1-5 scale the prompts ask for.
    pub confidence: u8,
    pub reasoning: String,
}

impl LlmVerdict {
    /// Confidence normalised to [0, 1].
    #[must_use]
    pub fn confidence_norm(&self) -> f64 {
        f64::from(self.confidence.clamp(1, 5)) / 5.0
    }

    /// Signed score: recommendation direction x normalised confidence.
    #[must_use]
    pub fn raw_score(&self) -> f64 {
        self.recommendation.direction() * self.confidence_norm()
    }
}

/// Strips surrounding whitespace and a markdown code fence, if present.
#[must_use]
pub fn normalize_response(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an optional language tag on the fence line.
    let rest = rest
        .split_once('\n')
        .map_or("", |(_, body)| body);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Parses a model response against the verdict schema.
///
/// # Errors
/// Returns a description of the defect for the failed-verdict reasoning.
pub fn parse_verdict(raw: &str) -> Result<LlmVerdict, String> {
    let body = normalize_response(raw);
    if body.is_empty() {
        return Err("empty response".to_string());
    }
    let verdict: LlmVerdict = serde_json::from_str(body)
        .map_err(|e| format!("response is not valid verdict JSON ({e})"))?;
    if !(1..=5).contains(&verdict.confidence) {
        return Err(format!(
            "confidence {} outside 1-5",
            verdict.confidence
        ));
    }
    if verdict.reasoning.trim().is_empty() {
        return Err("reasoning is empty".to_string());
    }
    Ok(verdict)
}

/// Turns a raw completion outcome into an agent verdict: schema-conforming
/// responses become scored verdicts, everything else a failed HOLD.
#[must_use]
pub fn into_agent_verdict(
    agent_name: &str,
    tag: &str,
    result: Result<String, ProviderError>,
    data_used: std::collections::BTreeMap<String, f64>,
    thresholds: &stocksense_core::SignalThresholds,
) -> stocksense_core::AgentVerdict {
    use stocksense_core::AgentVerdict;

    let raw = match result {
        Ok(raw) => raw,
        Err(err) => return AgentVerdict::failed(agent_name, err),
    };
    match parse_verdict(&raw) {
        Ok(verdict) => AgentVerdict::from_score(
            agent_name,
            verdict.raw_score(),
            verdict.confidence_norm(),
            format!("[{tag}] {}", verdict.reasoning),
            data_used,
            thresholds,
        ),
        Err(defect) => AgentVerdict::failed(agent_name, defect),
    }
}

/// Breaker-and-retry wrapper shared by the vendor adapters.
pub(crate) async fn guarded<F, Fut>(
    breaker: &stocksense_aggregator::CircuitBreaker,
    retry: &stocksense_aggregator::RetryPolicy,
    vendor: &str,
    call: F,
) -> Result<String, ProviderError>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<String, ProviderError>>,
{
    if !breaker.can_execute() {
        return Err(ProviderError::BreakerOpen {
            provider: vendor.to_string(),
        });
    }
    let result = retry.run(vendor, || call()).await;
    match &result {
        Ok(_) => breaker.record_success(),
        Err(_) => breaker.record_failure(),
    }
    result
}

/// Maps a non-success HTTP response to a `ProviderError`.
pub(crate) async fn error_for_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Http {
        status: status.as_u16(),
        body: body.chars().take(200).collect(),
    })
}

/// Shared instruction block appended to every analyst system prompt.
pub const RESPONSE_FORMAT: &str = r#"Respond with ONLY a JSON object in exactly this format, no markdown, no prose:
{
    "recommendation": "BUY" | "SELL" | "HOLD",
    "confidence": 1 to 5,
    "reasoning": "2-3 sentences explaining the call"
}"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_fences_and_whitespace() {
        assert_eq!(normalize_response("  {\"a\":1}  "), "{\"a\":1}");
        assert_eq!(
            normalize_response("```json\n{\"a\":1}\n```"),
            "{\"a\":1}"
        );
        assert_eq!(normalize_response("```\n{\"a\":1}\n```"), "{\"a\":1}");
    }

    #[test]
    fn parse_accepts_conforming_response() {
        let verdict = parse_verdict(
            r#"{"recommendation": "BUY", "confidence": 4, "reasoning": "Oversold with fearful crowd."}"#,
        )
        .unwrap();
        assert_eq!(verdict.recommendation, Recommendation::Buy);
        assert!((verdict.confidence_norm() - 0.8).abs() < f64::EPSILON);
        assert!((verdict.raw_score() - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn parse_accepts_fenced_response() {
        let raw = "```json\n{\"recommendation\": \"SELL\", \"confidence\": 3, \"reasoning\": \"Greed.\"}\n```";
        let verdict = parse_verdict(raw).unwrap();
        assert_eq!(verdict.recommendation, Recommendation::Sell);
        assert!((verdict.raw_score() + 0.6).abs() < f64::EPSILON);
    }

    #[test]
    fn hold_scores_zero_regardless_of_confidence() {
        let verdict = parse_verdict(
            r#"{"recommendation": "HOLD", "confidence": 5, "reasoning": "No edge."}"#,
        )
        .unwrap();
        assert_eq!(verdict.raw_score(), 0.0);
        assert_eq!(verdict.confidence_norm(), 1.0);
    }

    #[test]
    fn parse_rejects_prose() {
        assert!(parse_verdict("I think you should buy this stock.").is_err());
    }

    #[test]
    fn parse_rejects_out_of_range_confidence() {
        assert!(parse_verdict(
            r#"{"recommendation": "BUY", "confidence": 0, "reasoning": "x"}"#
        )
        .is_err());
        assert!(parse_verdict(
            r#"{"recommendation": "BUY", "confidence": 9, "reasoning": "x"}"#
        )
        .is_err());
    }

    #[test]
    fn parse_rejects_unknown_fields_and_empty_reasoning() {
        assert!(parse_verdict(
            r#"{"recommendation": "BUY", "confidence": 3, "reasoning": "x", "score": 0.5}"#
        )
        .is_err());
        assert!(parse_verdict(
            r#"{"recommendation": "BUY", "confidence": 3, "reasoning": "  "}"#
        )
        .is_err());
    }

    #[test]
    fn parse_rejects_empty_response() {
        assert!(parse_verdict("").is_err());
        assert!(parse_verdict("```json\n```").is_err());
    }
}
