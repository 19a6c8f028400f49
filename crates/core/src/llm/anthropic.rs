//! # Anthropic Client
//!
//! LLM client implementation for the Anthropic Claude API.

use async_trait::async_trait;
use serde::Deserialize;

use super::{GenerateError, GenerateOptions, LlmClient};

/// Default Anthropic model
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Anthropic Claude API client
#[derive(Clone)]
pub struct AnthropicClient {
    api_key: String,
    client: reqwest::Client,
    model: String,
}

impl AnthropicClient {
    /// Create a new client with the given API key
    pub fn new(api_key: String) -> Self {
        let model = std::env::var("ANTHROPIC_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Self::with_model(api_key, &model)
    }

    /// Create with a specific model
    pub fn with_model(api_key: String, model: &str) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
            model: model.to_string(),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self, GenerateError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| {
            GenerateError::NotConfigured("ANTHROPIC_API_KEY environment variable not set".into())
        })?;
        Ok(Self::new(api_key))
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn generate(
        &self,
        system: &str,
        prompt: &str,
        opts: &GenerateOptions,
    ) -> Result<String, GenerateError> {
        let mut body = serde_json::json!({
            "model": &self.model,
            "max_tokens": opts.max_output_tokens,
            "system": system,
            "messages": [{"role": "user", "content": prompt}]
        });
        if let Some(temperature) = opts.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }

        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .timeout(opts.timeout())
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerateError::Http { status, body });
        }

        #[derive(Deserialize)]
        struct ContentBlock {
            text: Option<String>,
        }
        #[derive(Deserialize)]
        struct ApiResponse {
            content: Vec<ContentBlock>,
        }

        let api_response: ApiResponse = response.json().await.map_err(map_reqwest_error)?;
        api_response
            .content
            .first()
            .and_then(|c| c.text.clone())
            .ok_or(GenerateError::EmptyResponse)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &'static str {
        "Anthropic"
    }
}

pub(super) fn map_reqwest_error(e: reqwest::Error) -> GenerateError {
    if e.is_timeout() {
        GenerateError::Timeout
    } else {
        GenerateError::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_model() {
        let client = AnthropicClient::with_model("test-key".to_string(), "claude-3-opus");
        assert_eq!(client.model_name(), "claude-3-opus");
        assert_eq!(client.provider_name(), "Anthropic");
    }
}
