//! Retry with exponential backoff for transient provider errors.

use std::time::Duration;

use anyhow::Result;

use crate::error::ProviderError;
use crate::traits::{CompletionRequest, CompletionResponse, LlmProvider};

/// Upper bound on a single backoff delay.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// How often and how patiently to retry a provider call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each subsequent retry.
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::ZERO,
        }
    }
}

/// Call `provider.complete`, retrying transient failures.
///
/// Permanent errors (see [`ProviderError::is_permanent`]) are returned
/// immediately. A rate-limit response's retry-after hint replaces the
/// computed backoff for the next attempt.
pub async fn complete_with_retry(
    provider: &dyn LlmProvider,
    request: &CompletionRequest,
    policy: &RetryPolicy,
) -> Result<CompletionResponse> {
    let mut delay = policy.initial_delay;
    let mut last_error = None;

    for retry in 0..=policy.max_retries {
        if retry > 0 {
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(MAX_RETRY_DELAY);
        }

        match provider.complete(request).await {
            Ok(response) => return Ok(response),
            Err(e) => {
                if let Some(provider_err) = e.downcast_ref::<ProviderError>() {
                    if provider_err.is_permanent() {
                        return Err(e);
                    }
                    if let Some(ms) = provider_err.retry_after_ms() {
                        delay = Duration::from_millis(ms).min(MAX_RETRY_DELAY);
                    }
                }
                tracing::debug!(
                    provider = provider.name(),
                    attempt = retry + 1,
                    "provider call failed: {e:#}"
                );
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("unknown error")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedProvider;

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "test".into(),
            system_prompt: String::new(),
            prompt: "hi".into(),
            max_tokens: 10,
            temperature: 0.0,
            json_mode: false,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_then_succeeds() {
        let provider = ScriptedProvider::sequence(vec![
            Err(ProviderError::NetworkError("reset".into())),
            Err(ProviderError::ApiError {
                status: 503,
                message: "busy".into(),
            }),
            Ok("done".into()),
        ]);
        let response = complete_with_retry(&provider, &request(), &RetryPolicy::default())
            .await
            .unwrap();
        assert_eq!(response.content, "done");
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_error_is_not_retried() {
        let provider = ScriptedProvider::sequence(vec![Err(
            ProviderError::AuthenticationFailed("bad key".into()),
        )]);
        let err = complete_with_retry(&provider, &request(), &RetryPolicy::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("authentication"));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_retries() {
        let provider = ScriptedProvider::sequence(vec![
            Err(ProviderError::Timeout(5)),
            Err(ProviderError::Timeout(5)),
            Err(ProviderError::Timeout(5)),
        ]);
        let policy = RetryPolicy {
            max_retries: 2,
            initial_delay: Duration::from_millis(100),
        };
        let err = complete_with_retry(&provider, &request(), &policy)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert_eq!(provider.call_count(), 3);
    }
}
