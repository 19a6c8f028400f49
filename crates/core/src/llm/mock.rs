//! Scripted LLM client for tests.
//!
//! Replays a queue of canned responses and counts invocations, so tests can
//! assert both on pipeline output and on how many generation calls were
//! actually made.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{GenerateError, GenerateOptions, LlmClient};

pub struct MockLlm {
    responses: Mutex<VecDeque<Result<String, GenerateError>>>,
    /// Replayed once the queue runs dry, if set.
    fallback: Option<String>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<(String, String)>>,
}

impl MockLlm {
    /// Script an exact sequence of responses.
    pub fn with_responses(responses: Vec<Result<String, GenerateError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            fallback: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Always return the same text, on every call.
    pub fn always(text: &str) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fallback: Some(text.to_string()),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Number of generation calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The (system, prompt) pairs seen so far.
    pub fn prompts(&self) -> Vec<(String, String)> {
        self.prompts.lock().expect("mock lock").clone()
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn generate(
        &self,
        system: &str,
        prompt: &str,
        _opts: &GenerateOptions,
    ) -> Result<String, GenerateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .expect("mock lock")
            .push((system.to_string(), prompt.to_string()));

        if let Some(response) = self.responses.lock().expect("mock lock").pop_front() {
            return response;
        }
        match &self.fallback {
            Some(text) => Ok(text.clone()),
            None => Err(GenerateError::Transport(
                "mock response queue exhausted".to_string(),
            )),
        }
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }

    fn provider_name(&self) -> &'static str {
        "Mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_replays_and_counts() {
        let mock = MockLlm::with_responses(vec![
            Ok("first".to_string()),
            Err(GenerateError::Timeout),
        ]);
        let opts = GenerateOptions::default();

        assert_eq!(mock.generate("s", "p", &opts).await.unwrap(), "first");
        assert!(mock.generate("s", "p", &opts).await.is_err());
        assert!(mock.generate("s", "p", &opts).await.is_err());
        assert_eq!(mock.calls(), 3);
        assert_eq!(mock.prompts().len(), 3);
    }
}
