//! Anthropic messages adapter.

use crate::llm::{error_for_status, guarded, CompletionClient};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use stocksense_aggregator::{CircuitBreaker, ProviderError, RetryPolicy};
use tracing::debug;

/// Production API base.
pub const ANTHROPIC_API_URL: &str = "https://api.anthropic.com";

const API_VERSION: &str = "2023-06-01";

pub struct AnthropicClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

impl AnthropicClient {
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
            base_url: ANTHROPIC_API_URL.to_string(),
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
        let url = format!("{}/v1/messages", self.base_url);
        debug!(vendor = "anthropic", model = %self.model, "message request");
        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&json!({
                "model": self.model,
                "max_tokens": self.max_tokens,
                "system": system,
                "messages": [{"role": "user", "content": user}],
            }))
            .send()
            .await?;
        let response = error_for_status(response).await?;
        let body: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        body.content
            .into_iter()
            .find(|block| block.kind == "text")
            .map(|block| block.text)
            .filter(|text| !text.is_empty())
            .ok_or_else(|| ProviderError::Malformed("no text content".into()))
    }
}

#[async_trait]
impl CompletionClient for AnthropicClient {
    fn vendor(&self) -> &str {
        "anthropic"
    }

    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, ProviderError> {
        guarded(&self.breaker, &self.retry, "anthropic", || {
            self.request_once(system_prompt, user_prompt)
        })
        .await
    }
}
