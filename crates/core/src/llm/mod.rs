//! # LLM Clients
//!
//! The external generation capability the pipeline consumes. The pipeline
//! does not care which provider backs the call; it only requires a
//! system/prompt split, bounded output size, a timeout, and a
//! distinguishable "no provider configured" error.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod anthropic;
pub mod openai;

#[cfg(test)]
pub mod mock;

pub use anthropic::AnthropicClient;
pub use openai::OpenAiClient;

// ============================================================================
// Options & Errors
// ============================================================================

/// Per-call generation options.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GenerateOptions {
    /// Sampling temperature; `None` leaves the provider default.
    pub temperature: Option<f32>,
    /// Output budget, to keep a single invocation's cost bounded.
    pub max_output_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: None,
            max_output_tokens: 4096,
            timeout_secs: 60,
        }
    }
}

impl GenerateOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Same options with temperature pinned to zero.
    pub fn with_zero_temperature(mut self) -> Self {
        self.temperature = Some(0.0);
        self
    }
}

/// Failure modes of a generation call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GenerateError {
    /// Fails loud: the pipeline never degrades to placeholder content when
    /// no provider is available.
    #[error("no generation provider configured: {0}")]
    NotConfigured(String),
    #[error("provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("generation call timed out")]
    Timeout,
    #[error("provider returned an empty response")]
    EmptyResponse,
}

impl GenerateError {
    /// Whether a retry with backoff is worth attempting.
    pub fn is_transient(&self) -> bool {
        match self {
            GenerateError::Transport(_) | GenerateError::Timeout => true,
            GenerateError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

// ============================================================================
// Client Trait
// ============================================================================

/// Unified client interface over generation providers.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Call the model with a system instruction and user prompt, returning
    /// the raw text response.
    async fn generate(
        &self,
        system: &str,
        prompt: &str,
        opts: &GenerateOptions,
    ) -> Result<String, GenerateError>;

    /// Model name for logging.
    fn model_name(&self) -> &str;

    /// Provider name for logging.
    fn provider_name(&self) -> &'static str;
}

/// Resolve a client from the environment: Anthropic first, then OpenAI.
pub fn client_from_env() -> Result<Arc<dyn LlmClient>, GenerateError> {
    if let Ok(client) = AnthropicClient::from_env() {
        return Ok(Arc::new(client));
    }
    if let Ok(client) = OpenAiClient::from_env() {
        return Ok(Arc::new(client));
    }
    Err(GenerateError::NotConfigured(
        "set ANTHROPIC_API_KEY or OPENAI_API_KEY".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(GenerateError::Timeout.is_transient());
        assert!(GenerateError::Transport("reset".into()).is_transient());
        assert!(GenerateError::Http {
            status: 503,
            body: String::new()
        }
        .is_transient());
        assert!(GenerateError::Http {
            status: 429,
            body: String::new()
        }
        .is_transient());
        assert!(!GenerateError::Http {
            status: 400,
            body: String::new()
        }
        .is_transient());
        assert!(!GenerateError::NotConfigured("x".into()).is_transient());
    }

    #[test]
    fn test_default_options_are_bounded() {
        let opts = GenerateOptions::default();
        assert!(opts.max_output_tokens > 0);
        assert!(opts.timeout_secs > 0);
        assert_eq!(opts.temperature, None);
        assert_eq!(opts.with_zero_temperature().temperature, Some(0.0));
    }
}
