//! Google Gemini adapter.

use crate::llm::{error_for_status, guarded, CompletionClient};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use stocksense_aggregator::{CircuitBreaker, ProviderError, RetryPolicy};
use tracing::debug;

/// Production API base.
pub const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com";

pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

impl GeminiClient {
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        api_key: String,
        model: String,
        max_tokens: u32,
        breaker: Arc<CircuitBreaker>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            http,
            base_url: GEMINI_API_URL.to_string(),
            api_key,
            model,
            max_tokens,
            breaker,
            retry,
        }
    }

    /// Overrides the API base URL (tests).
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    async fn request_once(&self, system: &str, user: &str) -> Result<String, ProviderError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        debug!(vendor = "gemini", model = %self.model, "generate request");
        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&json!({
                "system_instruction": {"parts": [{"text": system}]},
                "contents": [{"role": "user", "parts": [{"text": user}]}],
                "generationConfig": {"maxOutputTokens": self.max_tokens, "temperature": 0.3},
            }))
            .send()
            .await?;
        let response = error_for_status(response).await?;
        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        body.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .map(|p| p.text)
            .filter(|text| !text.is_empty())
            .ok_or_else(|| ProviderError::Malformed("no candidate text".into()))
    }
}

#[async_trait]
impl CompletionClient for GeminiClient {
    fn vendor(&self) -> &str {
        "gemini"
    }

    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, ProviderError> {
        guarded(&self.breaker, &self.retry, "gemini", || {
            self.request_once(system_prompt, user_prompt)
        })
        .await
    }
}
