//! OpenAI chat-completions adapter.

use crate::llm::{error_for_status, guarded, CompletionClient};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use stocksense_aggregator::{CircuitBreaker, ProviderError, RetryPolicy};
use tracing::debug;

/// Production API base.
pub const OPENAI_API_URL: &str = "https://api.openai.com";

pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: Option<String>,
}

impl OpenAiClient {
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
            base_url: OPENAI_API_URL.to_string(),
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
        let url = format!("{}/v1/chat/completions", self.base_url);
        debug!(vendor = "openai", model = %self.model, "chat completion");
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "messages": [
                    {"role": "system", "content": system},
                    {"role": "user", "content": user}
                ],
                "temperature": 0.3,
                "max_tokens": self.max_tokens,
            }))
            .send()
            .await?;
        let response = error_for_status(response).await?;
        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.is_empty())
            .ok_or_else(|| ProviderError::Malformed("empty completion".into()))
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    fn vendor(&self) -> &str {
        "openai"
    }

    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, ProviderError> {
        guarded(&self.breaker, &self.retry, "openai", || {
            self.request_once(system_prompt, user_prompt)
        })
        .await
    }
}
