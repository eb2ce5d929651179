//! Configuration types.

use std::time::Duration;

use crate::llm::retry::RetryPolicy;

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Ceiling timeout for a single job dispatch. An agent call that has not
    /// settled by then is recorded as a retryable timeout failure.
    pub job_timeout: Duration,
    /// Maximum explicit retries per job.
    pub max_job_retries: u32,
    /// Transient-failure retry policy for outbound generation calls.
    pub retry: RetryPolicy,
    /// Capacity of the audit broadcast channel.
    pub audit_capacity: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            job_timeout: Duration::from_secs(300), // 5 minutes
            max_job_retries: 3,
            retry: RetryPolicy::default(),
            audit_capacity: 256,
        }
    }
}
