//! Generation provider abstraction.
//!
//! Agents never talk to a model SDK directly; they hold an
//! `Arc<dyn GenerationProvider>` injected at construction, which keeps the
//! external dependency swappable with a test double.

use async_trait::async_trait;

use crate::error::GenerationError;

/// A single text-generation request.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// System preamble, when the agent wants one.
    pub system: Option<String>,
    /// User prompt.
    pub prompt: String,
    pub max_tokens: Option<u64>,
    pub temperature: Option<f64>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            max_tokens: None,
            temperature: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Raw model output.
#[derive(Debug, Clone)]
pub struct GenerationResponse {
    pub content: String,
}

/// Opaque generation dependency: given a prompt, returns text or raises.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Model identifier for provenance records.
    fn model_name(&self) -> &str;

    /// Execute one generation call.
    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResponse, GenerationError>;
}
