//! # Didact Models
//!
//! Centralized LLM configuration types for the pipeline. The pipeline core
//! never talks to a provider directly; it resolves a [`ModelConfig`] into a
//! boxed [`LlmClient`] once and threads it through the build.

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::llm::{AnthropicClient, GenerateError, LlmClient, OpenAiClient};

/// Supported LLM providers
///
/// - Anthropic (Claude) - `ANTHROPIC_API_KEY`
/// - OpenAI (GPT) - `OPENAI_API_KEY`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Anthropic,
    #[serde(rename = "openai")]
    OpenAI,
}

impl LlmProvider {
    /// Get all available providers
    pub fn all() -> Vec<LlmProvider> {
        vec![LlmProvider::Anthropic, LlmProvider::OpenAI]
    }

    /// Display name for logs
    pub fn display_name(&self) -> &'static str {
        match self {
            LlmProvider::Anthropic => "Anthropic",
            LlmProvider::OpenAI => "OpenAI",
        }
    }

    /// Whether this provider supports a custom base URL
    pub fn supports_base_url(&self) -> bool {
        matches!(self, LlmProvider::OpenAI)
    }

    /// Default model for this provider
    pub fn default_model(&self) -> &'static str {
        match self {
            LlmProvider::Anthropic => "claude-sonnet-4-20250514",
            LlmProvider::OpenAI => "gpt-4o",
        }
    }
}

/// Error type for parsing an [`LlmProvider`]
#[derive(Debug)]
pub struct ParseProviderError(String);

impl std::fmt::Display for ParseProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ParseProviderError {}

impl FromStr for LlmProvider {
    type Err = ParseProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "anthropic" | "claude" => Ok(LlmProvider::Anthropic),
            "openai" | "gpt" => Ok(LlmProvider::OpenAI),
            other => Err(ParseProviderError(format!(
                "Unknown provider '{}'. Valid values: anthropic, claude, openai, gpt",
                other
            ))),
        }
    }
}

/// Configuration for LLM model selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// LLM provider to use
    #[serde(default)]
    pub provider: LlmProvider,
    /// Model name (e.g., "claude-sonnet-4-20250514", "gpt-4o")
    pub model: String,
    /// Optional base URL override for OpenAI-compatible APIs
    pub base_url: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        let provider = LlmProvider::default();
        Self {
            provider,
            model: provider.default_model().to_string(),
            base_url: None,
        }
    }
}

impl ModelConfig {
    /// Create a new model config with the default provider (Anthropic)
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            provider: LlmProvider::Anthropic,
            model: model.into(),
            base_url: None,
        }
    }

    /// Create config for a specific provider
    pub fn with_provider(provider: LlmProvider, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            base_url: None,
        }
    }

    /// Set base URL (for OpenAI-compatible endpoints)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Resolve a client for the configured provider. API keys come from the
    /// environment; a missing key surfaces as the distinct
    /// [`GenerateError::NotConfigured`].
    pub fn create_client(&self) -> Result<Arc<dyn LlmClient>, GenerateError> {
        match self.provider {
            LlmProvider::Anthropic => {
                let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| {
                    GenerateError::NotConfigured(
                        "ANTHROPIC_API_KEY environment variable not set".into(),
                    )
                })?;
                Ok(Arc::new(AnthropicClient::with_model(api_key, &self.model)))
            }
            LlmProvider::OpenAI => {
                let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
                    GenerateError::NotConfigured(
                        "OPENAI_API_KEY environment variable not set".into(),
                    )
                })?;
                let mut client = OpenAiClient::with_model(api_key, &self.model);
                if let Some(base_url) = &self.base_url {
                    client = client.with_base_url(base_url);
                }
                Ok(Arc::new(client))
            }
        }
    }
}
