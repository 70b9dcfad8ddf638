//! Mock provider for testing.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use readcheck_core::traits::{
    CompletionRequest, CompletionResponse, LlmProvider, ModelInfo, TokenUsage,
};

use crate::ProviderError;

/// A failure the mock should simulate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockFailure {
    Network,
    Timeout,
    Status(u16),
}

impl MockFailure {
    fn to_error(&self) -> ProviderError {
        match self {
            MockFailure::Network => ProviderError::NetworkError("connection refused".into()),
            MockFailure::Timeout => ProviderError::Timeout(60),
            MockFailure::Status(401) => ProviderError::AuthenticationFailed("invalid key".into()),
            MockFailure::Status(status) => ProviderError::ApiError {
                status: *status,
                message: "mock failure".into(),
            },
        }
    }
}

#[derive(Debug, Clone)]
enum MockReply {
    Content(String),
    Fail(MockFailure),
}

/// A mock LLM provider for exercising the assessment flow without real API
/// calls.
///
/// Replies are chosen by the first rule whose needle occurs in the prompt,
/// falling back to a default reply.
pub struct MockProvider {
    rules: Vec<(String, MockReply)>,
    default_reply: MockReply,
    call_count: AtomicU32,
    last_request: Mutex<Option<CompletionRequest>>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::with_fixed_response("{}")
    }
}

impl MockProvider {
    /// Create a mock that always returns the same response.
    pub fn with_fixed_response(response: &str) -> Self {
        Self {
            rules: Vec::new(),
            default_reply: MockReply::Content(response.to_string()),
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Reply with `response` to prompts containing `needle`.
    pub fn on_prompt(mut self, needle: &str, response: &str) -> Self {
        self.rules
            .push((needle.to_string(), MockReply::Content(response.to_string())));
        self
    }

    /// Fail prompts containing `needle`.
    pub fn fail_on(mut self, needle: &str, failure: MockFailure) -> Self {
        self.rules
            .push((needle.to_string(), MockReply::Fail(failure)));
        self
    }

    /// Fail every prompt no other rule matches.
    pub fn fail_by_default(mut self, failure: MockFailure) -> Self {
        self.default_reply = MockReply::Fail(failure);
        self
    }

    /// Get the number of calls made to this provider.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Get the last request made to this provider.
    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.last_request
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: &CompletionRequest) -> anyhow::Result<CompletionResponse> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        *self.last_request.lock().unwrap_or_else(|e| e.into_inner()) = Some(request.clone());

        let reply = self
            .rules
            .iter()
            .find(|(needle, _)| request.prompt.contains(needle.as_str()))
            .map(|(_, reply)| reply)
            .unwrap_or(&self.default_reply);

        let content = match reply {
            MockReply::Content(content) => content.clone(),
            MockReply::Fail(failure) => return Err(failure.to_error().into()),
        };

        let prompt_tokens = (request.prompt.len() / 4) as u32; // Rough estimate
        let completion_tokens = (content.len() / 4) as u32;

        Ok(CompletionResponse {
            content,
            model: request.model.clone(),
            token_usage: TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
            latency_ms: 1,
        })
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        vec![ModelInfo {
            id: "mock-model".into(),
            name: "Mock Model".into(),
            provider: "mock".into(),
            max_context: 100_000,
        }]
    }
}
