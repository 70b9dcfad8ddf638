//! In-crate scripted provider for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::traits::{CompletionRequest, CompletionResponse, LlmProvider, ModelInfo, TokenUsage};

type Responder = Box<dyn Fn(&CompletionRequest) -> anyhow::Result<String> + Send + Sync>;

pub(crate) struct ScriptedProvider {
    responder: Option<Responder>,
    sequence: Mutex<VecDeque<Result<String, ProviderError>>>,
    delays: Vec<(String, Duration)>,
    calls: AtomicU32,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    /// Replies computed from each request.
    pub(crate) fn from_fn(
        f: impl Fn(&CompletionRequest) -> anyhow::Result<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Some(Box::new(f)),
            sequence: Mutex::new(VecDeque::new()),
            delays: Vec::new(),
            calls: AtomicU32::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Replies taken in order, one per call.
    pub(crate) fn sequence(replies: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            responder: None,
            sequence: Mutex::new(replies.into()),
            delays: Vec::new(),
            calls: AtomicU32::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Sleep before answering any prompt containing `needle`.
    pub(crate) fn with_delay(mut self, needle: &str, delay: Duration) -> Self {
        self.delays.push((needle.to_string(), delay));
        self
    }

    pub(crate) fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> anyhow::Result<CompletionResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.prompt.clone());

        if let Some((_, delay)) = self
            .delays
            .iter()
            .find(|(needle, _)| request.prompt.contains(needle.as_str()))
        {
            tokio::time::sleep(*delay).await;
        }

        let content = match &self.responder {
            Some(f) => f(request)?,
            None => {
                let next = self.sequence.lock().unwrap().pop_front();
                match next {
                    Some(reply) => reply?,
                    None => anyhow::bail!("script exhausted"),
                }
            }
        };

        Ok(CompletionResponse {
            content,
            model: request.model.clone(),
            token_usage: TokenUsage::default(),
            latency_ms: 0,
        })
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        Vec::new()
    }
}
