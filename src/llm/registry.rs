//! Model registry built once at process start

use super::models::{all_models, find_model, DEFAULT_MODEL_ID};
use super::openai::{OpenAIService, Sampling};
use super::{LlmService, LoggingService, RetryPolicy, RetryingService};
use std::collections::HashMap;
use std::sync::Arc;

/// Configuration for the model gateway
#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    /// Base URL of the OpenAI-compatible gateway (e.g. `https://chat-ai.example/v1`)
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    /// Default model ID
    pub default_model: Option<String>,
    pub retry: RetryPolicy,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self {
            api_url: std::env::var("CHATAI_API_URL").ok(),
            api_key: std::env::var("CHATAI_API_KEY").ok(),
            default_model: std::env::var("DEFAULT_MODEL").ok(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Registry of available models
pub struct ModelRegistry {
    services: HashMap<String, Arc<dyn LlmService>>,
    default_model: String,
}

impl ModelRegistry {
    pub fn new(config: &LlmConfig) -> Self {
        let mut services: HashMap<String, Arc<dyn LlmService>> = HashMap::new();

        match (config.api_url.as_deref(), config.api_key.as_deref()) {
            (Some(url), Some(key)) if !url.is_empty() && !key.is_empty() => {
                for model_def in all_models() {
                    let service: Arc<dyn LlmService> = Arc::new(OpenAIService::new(
                        key.to_string(),
                        url,
                        model_def.api_name,
                        model_def.id,
                        Sampling::default(),
                    ));
                    services.insert(model_def.id.to_string(), Self::decorate(service, config));
                }
            }
            _ => {
                tracing::error!("CHATAI_API_URL or CHATAI_API_KEY not set, no models available");
            }
        }

        let default_model = config
            .default_model
            .clone()
            .filter(|id| find_model(id).is_some())
            .unwrap_or_else(|| DEFAULT_MODEL_ID.to_string());

        Self {
            services,
            default_model,
        }
    }

    /// Build a registry from pre-made services (used by tests and embedders)
    #[allow(dead_code)]
    pub fn from_services(
        services: impl IntoIterator<Item = Arc<dyn LlmService>>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            services: services
                .into_iter()
                .map(|s| (s.model_id().to_string(), s))
                .collect(),
            default_model: default_model.into(),
        }
    }

    /// Logging sits inside retries so every attempt is recorded
    fn decorate(service: Arc<dyn LlmService>, config: &LlmConfig) -> Arc<dyn LlmService> {
        let logged: Arc<dyn LlmService> = Arc::new(LoggingService::new(service));
        Arc::new(RetryingService::new(logged, config.retry))
    }

    /// Get a model by ID
    pub fn get(&self, model_id: &str) -> Option<Arc<dyn LlmService>> {
        self.services.get(model_id).cloned()
    }

    /// Get a model by ID, falling back to the default model
    pub fn resolve(&self, model_id: &str) -> Option<Arc<dyn LlmService>> {
        self.get(model_id).or_else(|| {
            tracing::warn!(
                requested = %model_id,
                fallback = %self.default_model,
                "Unknown model, using default"
            );
            self.get(&self.default_model)
        })
    }

    /// Get the default model ID
    pub fn default_model_id(&self) -> &str {
        &self.default_model
    }

    /// List all available model IDs
    pub fn available_models(&self) -> Vec<String> {
        let mut models: Vec<_> = self.services.keys().cloned().collect();
        models.sort();
        models
    }

    pub fn has_model(&self, model_id: &str) -> bool {
        self.services.contains_key(model_id)
    }

    /// Check if any models are available
    pub fn has_models(&self) -> bool {
        !self.services.is_empty()
    }
}
