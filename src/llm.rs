//! Model client abstraction
//!
//! Every node talks to the model through [`LlmService`]. Retries and
//! logging are decorators around a provider, so nodes only ever see the
//! final outcome of a call.

mod error;
mod models;
mod openai;
mod registry;
mod types;

pub use error::LlmError;
pub use models::find_model;
pub use registry::{LlmConfig, ModelRegistry};
pub use types::*;

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Common interface for model providers
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Make a completion request and wait for the full response
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;

    /// Open a streamed completion yielding text deltas
    async fn stream(&self, request: &LlmRequest) -> Result<LlmStream, LlmError>;

    /// Get the model ID
    fn model_id(&self) -> &str;
}

/// Logging wrapper for model services
pub struct LoggingService {
    inner: Arc<dyn LlmService>,
    model_id: String,
}

impl LoggingService {
    pub fn new(inner: Arc<dyn LlmService>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }

    fn log_failure(&self, duration: Duration, e: &LlmError, what: &str) {
        tracing::error!(
            model = %self.model_id,
            duration_ms = %duration.as_millis(),
            error = %e.message,
            kind = ?e.kind,
            retryable = e.is_retryable(),
            "{what} failed"
        );
    }
}

#[async_trait]
impl LlmService for LoggingService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let start = std::time::Instant::now();
        let result = self.inner.complete(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(response) => {
                tracing::info!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    input_tokens = response.usage.input_tokens,
                    output_tokens = response.usage.output_tokens,
                    "Model request completed"
                );
            }
            Err(e) => self.log_failure(duration, e, "Model request"),
        }

        result
    }

    async fn stream(&self, request: &LlmRequest) -> Result<LlmStream, LlmError> {
        let start = std::time::Instant::now();
        let result = self.inner.stream(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(_) => {
                tracing::info!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    "Model stream opened"
                );
            }
            Err(e) => self.log_failure(duration, e, "Model stream"),
        }

        result
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Bounded retry budget for transient failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff (1s, 2s, ...) unless the provider asked for a delay
    fn delay_for(&self, retry: u32, error: &LlmError) -> Duration {
        error
            .retry_after
            .unwrap_or_else(|| self.base_delay * (1 << retry.saturating_sub(1).min(8)))
    }
}

/// Retries retryable failures; callers see only the final outcome.
///
/// Only opening a stream is retried. Once deltas flow, an error is final.
pub struct RetryingService {
    inner: Arc<dyn LlmService>,
    policy: RetryPolicy,
}

impl RetryingService {
    pub fn new(inner: Arc<dyn LlmService>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    async fn with_retries<T, F, Fut>(&self, mut op: F) -> Result<T, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let mut retry = 0;
        loop {
            match op().await {
                Err(e) if e.is_retryable() && retry < self.policy.max_retries => {
                    retry += 1;
                    let delay = self.policy.delay_for(retry, &e);
                    tracing::warn!(
                        model = %self.inner.model_id(),
                        attempt = retry + 1,
                        max_attempts = self.policy.max_retries + 1,
                        delay_ms = %delay.as_millis(),
                        error = %e.message,
                        "Retrying model request"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}

#[async_trait]
impl LlmService for RetryingService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.with_retries(|| self.inner.complete(request)).await
    }

    async fn stream(&self, request: &LlmRequest) -> Result<LlmStream, LlmError> {
        self.with_retries(|| self.inner.stream(request)).await
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}
