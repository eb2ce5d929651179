//! Generation provider integration.
//!
//! Supports:
//! - **Anthropic**: Direct API access via rig-core
//! - **OpenAI**: Direct API access via rig-core
//!
//! Uses the rig-core crate for HTTP transport and `RigProvider` to bridge
//! rig's `CompletionModel` trait to our `GenerationProvider` trait. Agents
//! only ever see the trait, so tests substitute a scripted double.

pub mod provider;
pub mod retry;

pub use provider::{GenerationProvider, GenerationRequest, GenerationResponse};
pub use retry::{RetryPolicy, with_retry};

use std::sync::Arc;

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::{AssistantContent, CompletionError, CompletionModel, Message};
use secrecy::ExposeSecret;

use crate::error::GenerationError;

/// Supported generation backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
    OpenAi,
}

/// Configuration for creating a generation provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
}

/// Create a generation provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn GenerationProvider>, GenerationError> {
    match config.backend {
        LlmBackend::Anthropic => create_anthropic_provider(config),
        LlmBackend::OpenAi => create_openai_provider(config),
    }
}

fn create_anthropic_provider(
    config: &LlmConfig,
) -> Result<Arc<dyn GenerationProvider>, GenerationError> {
    use rig::providers::anthropic;

    let client: rig::client::Client<anthropic::client::AnthropicExt> =
        anthropic::Client::new(config.api_key.expose_secret()).map_err(|e| {
            GenerationError::RequestFailed {
                provider: "anthropic".to_string(),
                reason: format!("Failed to create Anthropic client: {}", e),
            }
        })?;

    let model = client.completion_model(&config.model);
    tracing::info!("Using Anthropic (model: {})", config.model);
    Ok(Arc::new(RigProvider::new(model, "anthropic", &config.model)))
}

fn create_openai_provider(
    config: &LlmConfig,
) -> Result<Arc<dyn GenerationProvider>, GenerationError> {
    use rig::providers::openai;

    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        openai::Client::new(config.api_key.expose_secret()).map_err(|e| {
            GenerationError::RequestFailed {
                provider: "openai".to_string(),
                reason: format!("Failed to create OpenAI client: {}", e),
            }
        })?;

    let model = client.completion_model(&config.model);
    tracing::info!("Using OpenAI (model: {})", config.model);
    Ok(Arc::new(RigProvider::new(model, "openai", &config.model)))
}

/// Bridges a rig `CompletionModel` to `GenerationProvider`.
pub struct RigProvider<M> {
    model: M,
    provider_name: String,
    model_name: String,
}

impl<M> RigProvider<M> {
    pub fn new(model: M, provider_name: &str, model_name: &str) -> Self {
        Self {
            model,
            provider_name: provider_name.to_string(),
            model_name: model_name.to_string(),
        }
    }

    fn map_error(&self, error: CompletionError) -> GenerationError {
        match error {
            CompletionError::HttpError(e) => GenerationError::RequestFailed {
                provider: self.provider_name.clone(),
                reason: e.to_string(),
            },
            CompletionError::JsonError(e) => GenerationError::InvalidResponse {
                provider: self.provider_name.clone(),
                reason: e.to_string(),
            },
            CompletionError::ProviderError(msg) | CompletionError::ResponseError(msg) => {
                self.classify_provider_error(msg)
            }
            other => GenerationError::RequestFailed {
                provider: self.provider_name.clone(),
                reason: other.to_string(),
            },
        }
    }

    /// Provider errors arrive as strings; classify the well-known ones so the
    /// retry layer can tell transient from terminal.
    fn classify_provider_error(&self, msg: String) -> GenerationError {
        let lower = msg.to_lowercase();
        if lower.contains("401") || lower.contains("unauthorized") || lower.contains("invalid api key")
        {
            GenerationError::AuthFailed {
                provider: self.provider_name.clone(),
            }
        } else if lower.contains("429") || lower.contains("rate limit") {
            GenerationError::RateLimited {
                provider: self.provider_name.clone(),
                retry_after: None,
            }
        } else if lower.contains("quota") || lower.contains("billing") {
            GenerationError::QuotaExhausted {
                provider: self.provider_name.clone(),
            }
        } else if lower.contains("404") || lower.contains("model not found") {
            GenerationError::ModelNotAvailable {
                provider: self.provider_name.clone(),
                model: self.model_name.clone(),
            }
        } else if lower.contains("400") || lower.contains("invalid request") {
            GenerationError::BadRequest { reason: msg }
        } else {
            GenerationError::RequestFailed {
                provider: self.provider_name.clone(),
                reason: msg,
            }
        }
    }
}

#[async_trait]
impl<M> GenerationProvider for RigProvider<M>
where
    M: CompletionModel + Send + Sync,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResponse, GenerationError> {
        let mut builder = self
            .model
            .completion_request(Message::user(request.prompt));
        if let Some(system) = request.system {
            builder = builder.preamble(system);
        }
        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(max_tokens);
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(temperature);
        }

        let response = builder.send().await.map_err(|e| self.map_error(e))?;

        let content: String = response
            .choice
            .iter()
            .filter_map(|part| match part {
                AssistantContent::Text(text) => Some(text.text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");

        if content.is_empty() {
            return Err(GenerationError::InvalidResponse {
                provider: self.provider_name.clone(),
                reason: "empty completion".to_string(),
            });
        }

        Ok(GenerationResponse { content })
    }
}
