//! Error types for the insight engine.

use std::time::Duration;

use uuid::Uuid;

/// Top-level error type for the engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Orchestration error: {0}")]
    Orchestration(#[from] OrchestrationError),
}

/// Pre-dispatch validation errors. Raised before any job is created.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Unknown agent type: {agent_type}")]
    UnknownAgentType { agent_type: String },

    #[error("At least one agent type must be selected")]
    NoAgentsSelected,

    #[error("Missing required parameters for {agent_type}: {}", missing.join(", "))]
    MissingParameters {
        agent_type: String,
        missing: Vec<String>,
    },

    #[error("Input of {size} bytes exceeds the {max} byte limit of {agent_type}")]
    InputTooLarge {
        agent_type: String,
        size: usize,
        max: usize,
    },

    #[error("Input reference not found: {reference}")]
    InputNotFound { reference: String },
}

/// Persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Errors from the external generation provider.
///
/// Retryable variants are re-attempted by the transient retry layer
/// (`llm::retry`); the rest short-circuit immediately.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Generation timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Bad request: {reason}")]
    BadRequest { reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Model {model} not available on provider {provider}")]
    ModelNotAvailable { provider: String, model: String },

    #[error("Quota exhausted for provider {provider}")]
    QuotaExhausted { provider: String },

    #[error("Unprocessable input: {reason}")]
    Unprocessable { reason: String },
}

impl GenerationError {
    /// Whether the transient retry layer may re-attempt the call.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RequestFailed { .. }
                | Self::RateLimited { .. }
                | Self::Timeout { .. }
                | Self::InvalidResponse { .. }
        )
    }
}

/// Errors surfaced by an agent's `process` call.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Parameter validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("Agent {agent_type} produced malformed output: {reason}")]
    MalformedOutput { agent_type: String, reason: String },
}

impl AgentError {
    /// Whether a job that failed with this error may be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) => false,
            Self::Generation(e) => e.is_retryable(),
            Self::MalformedOutput { .. } => false,
        }
    }
}

/// Job bookkeeping errors (state machine misuse, not per-job work failures).
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Job {id} not found")]
    NotFound { id: Uuid },

    #[error("Job {id} cannot transition from {from} to {to}")]
    InvalidTransition { id: Uuid, from: String, to: String },

    #[error("Job {id} cannot be retried: {reason}")]
    RetryNotAllowed { id: Uuid, reason: String },
}

/// Failures of the orchestration's own shared logic.
///
/// This is the only error class that moves a task to `failed`; individual
/// agent failures are contained per-job and never escape here.
#[derive(Debug, thiserror::Error)]
pub enum OrchestrationError {
    #[error("Aggregation failed: {0}")]
    Aggregation(#[from] AggregationError),

    #[error("Task {id} not found")]
    TaskNotFound { id: Uuid },

    #[error("Task {id} is {status}, expected {expected}")]
    InvalidTaskState {
        id: Uuid,
        status: String,
        expected: String,
    },
}

/// Internal programming errors detected during report synthesis.
#[derive(Debug, thiserror::Error)]
pub enum AggregationError {
    #[error("Malformed result {result_id}: {reason}")]
    MalformedResult { result_id: Uuid, reason: String },
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_generation_errors() {
        assert!(
            GenerationError::RequestFailed {
                provider: "test".into(),
                reason: "connection reset".into(),
            }
            .is_retryable()
        );
        assert!(
            GenerationError::Timeout {
                after: Duration::from_secs(300)
            }
            .is_retryable()
        );
        assert!(
            GenerationError::RateLimited {
                provider: "test".into(),
                retry_after: None,
            }
            .is_retryable()
        );
    }

    #[test]
    fn non_retryable_generation_errors() {
        assert!(
            !GenerationError::BadRequest {
                reason: "empty prompt".into()
            }
            .is_retryable()
        );
        assert!(
            !GenerationError::AuthFailed {
                provider: "test".into()
            }
            .is_retryable()
        );
        assert!(
            !GenerationError::QuotaExhausted {
                provider: "test".into()
            }
            .is_retryable()
        );
        assert!(
            !GenerationError::Unprocessable {
                reason: "binary input".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn agent_error_retryability_follows_cause() {
        let transient: AgentError = GenerationError::RequestFailed {
            provider: "test".into(),
            reason: "503".into(),
        }
        .into();
        assert!(transient.is_retryable());

        let validation: AgentError = ValidationError::MissingParameters {
            agent_type: "news_summarization".into(),
            missing: vec!["summary_type".into()],
        }
        .into();
        assert!(!validation.is_retryable());

        let malformed = AgentError::MalformedOutput {
            agent_type: "data_extraction".into(),
            reason: "no JSON object".into(),
        };
        assert!(!malformed.is_retryable());
    }
}
