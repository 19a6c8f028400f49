//! # OpenAI Client
//!
//! LLM client implementation for the OpenAI chat completions API.

use async_trait::async_trait;
use serde::Deserialize;

use super::anthropic::map_reqwest_error;
use super::{GenerateError, GenerateOptions, LlmClient};

/// Default OpenAI model
const DEFAULT_MODEL: &str = "gpt-4o";

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI API client, usable against any OpenAI-compatible endpoint via
/// a base URL override.
#[derive(Clone)]
pub struct OpenAiClient {
    api_key: String,
    client: reqwest::Client,
    model: String,
    base_url: String,
}

impl OpenAiClient {
    /// Create a new client with the given API key
    pub fn new(api_key: String) -> Self {
        let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Self::with_model(api_key, &model)
    }

    /// Create with a specific model
    pub fn with_model(api_key: String, model: &str) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
            model: model.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point at an OpenAI-compatible endpoint
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self, GenerateError> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            GenerateError::NotConfigured("OPENAI_API_KEY environment variable not set".into())
        })?;
        Ok(Self::new(api_key))
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn generate(
        &self,
        system: &str,
        prompt: &str,
        opts: &GenerateOptions,
    ) -> Result<String, GenerateError> {
        let mut body = serde_json::json!({
            "model": &self.model,
            "max_tokens": opts.max_output_tokens,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": prompt}
            ]
        });
        if let Some(temperature) = opts.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
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
        struct Message {
            content: String,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: Message,
        }
        #[derive(Deserialize)]
        struct ApiResponse {
            choices: Vec<Choice>,
        }

        let api_response: ApiResponse = response.json().await.map_err(map_reqwest_error)?;
        api_response
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or(GenerateError::EmptyResponse)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &'static str {
        "OpenAI"
    }
}
