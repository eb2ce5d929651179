//! Job entity: one agent's execution attempt within a task.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::JobError;

/// Status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for dispatch.
    Queued,
    /// Dispatched, agent call in flight.
    Running,
    /// Agent produced an output.
    Completed,
    /// Agent call failed or timed out.
    Failed,
    /// Cancelled before settling.
    Cancelled,
}

impl JobStatus {
    pub fn can_transition_to(&self, target: JobStatus) -> bool {
        use JobStatus::*;

        matches!(
            (self, target),
            (Queued, Running)
                | (Queued, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// What kind of failure settled the job. Timeouts are kept distinct so an
/// operator can triage them separately from application errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    Generation,
    Agent,
}

/// Failure info recorded on a failed job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobFailure {
    pub message: String,
    pub kind: FailureKind,
    /// Whether an explicit job-level retry is permitted.
    pub retryable: bool,
    pub timestamp: DateTime<Utc>,
}

/// One agent's execution attempt against a task's input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub task_id: Uuid,
    pub agent_type: String,
    /// Snapshot of the input the agent will see.
    pub input: String,
    /// Effective parameters: agent defaults merged under caller values.
    pub parameters: serde_json::Map<String, serde_json::Value>,
    pub status: JobStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub failure: Option<JobFailure>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new queued job.
    pub fn new(
        task_id: Uuid,
        agent_type: impl Into<String>,
        input: impl Into<String>,
        parameters: serde_json::Map<String, serde_json::Value>,
        max_retries: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            agent_type: agent_type.into(),
            input: input.into(),
            parameters,
            status: JobStatus::Queued,
            retry_count: 0,
            max_retries,
            failure: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Current attempt number (0-based; equals the number of retries so far).
    pub fn attempt(&self) -> u32 {
        self.retry_count
    }

    pub fn transition_to(&mut self, target: JobStatus) -> Result<(), JobError> {
        if !self.status.can_transition_to(target) {
            return Err(JobError::InvalidTransition {
                id: self.id,
                from: self.status.to_string(),
                to: target.to_string(),
            });
        }
        self.status = target;
        match target {
            JobStatus::Running if self.started_at.is_none() => {
                self.started_at = Some(Utc::now());
            }
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => {
                self.completed_at = Some(Utc::now());
            }
            _ => {}
        }
        Ok(())
    }

    /// Settle as completed.
    pub fn complete(&mut self) -> Result<(), JobError> {
        self.transition_to(JobStatus::Completed)
    }

    /// Settle as failed with the given failure info.
    pub fn fail(
        &mut self,
        message: impl Into<String>,
        kind: FailureKind,
        retryable: bool,
    ) -> Result<(), JobError> {
        self.transition_to(JobStatus::Failed)?;
        self.failure = Some(JobFailure {
            message: message.into(),
            kind,
            retryable,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Whether an explicit retry is currently permitted.
    pub fn can_retry(&self) -> bool {
        self.status == JobStatus::Failed
            && self.retry_count < self.max_retries
            && self.failure.as_ref().is_some_and(|f| f.retryable)
    }

    /// Re-enter a failed job into dispatch.
    ///
    /// Resets exactly {status, failure, started_at, completed_at} and
    /// increments `retry_count`. The same record is reused; retrying never
    /// creates a duplicate job.
    pub fn retry(&mut self) -> Result<(), JobError> {
        if self.status != JobStatus::Failed {
            return Err(JobError::RetryNotAllowed {
                id: self.id,
                reason: format!("job is {}, only failed jobs can be retried", self.status),
            });
        }
        if self.retry_count >= self.max_retries {
            return Err(JobError::RetryNotAllowed {
                id: self.id,
                reason: format!("retry budget exhausted ({} of {})", self.retry_count, self.max_retries),
            });
        }
        if !self.failure.as_ref().is_some_and(|f| f.retryable) {
            return Err(JobError::RetryNotAllowed {
                id: self.id,
                reason: "failure is not retryable".into(),
            });
        }

        self.status = JobStatus::Queued;
        self.failure = None;
        self.started_at = None;
        self.completed_at = None;
        self.retry_count += 1;
        Ok(())
    }

    /// Wall-clock duration from dispatch to settlement.
    pub fn duration(&self) -> Option<Duration> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => {
                Some(Duration::from_millis(
                    end.signed_duration_since(start).num_milliseconds().max(0) as u64,
                ))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed_job(retryable: bool) -> Job {
        let mut job = Job::new(
            Uuid::new_v4(),
            "news_summarization",
            "article text",
            serde_json::Map::new(),
            3,
        );
        job.transition_to(JobStatus::Running).unwrap();
        job.fail("provider 503", FailureKind::Generation, retryable)
            .unwrap();
        job
    }

    #[test]
    fn status_transitions() {
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Cancelled));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Failed));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Cancelled));

        assert!(!JobStatus::Queued.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Cancelled.can_transition_to(JobStatus::Queued));
    }

    #[test]
    fn retry_resets_exactly_the_attempt_fields() {
        let mut job = failed_job(true);
        let created_at = job.created_at;
        let input = job.input.clone();

        job.retry().unwrap();

        assert_eq!(job.status, JobStatus::Queued);
        assert!(job.failure.is_none());
        assert!(job.started_at.is_none());
        assert!(job.completed_at.is_none());
        assert_eq!(job.retry_count, 1);
        // Untouched fields
        assert_eq!(job.created_at, created_at);
        assert_eq!(job.input, input);
        assert_eq!(job.max_retries, 3);
    }

    #[test]
    fn retry_rejected_when_budget_exhausted() {
        let mut job = failed_job(true);
        job.retry_count = job.max_retries;
        let err = job.retry().unwrap_err();
        assert!(matches!(err, JobError::RetryNotAllowed { .. }));
        assert_eq!(job.retry_count, 3);
    }

    #[test]
    fn retry_rejected_for_non_retryable_failure() {
        let mut job = failed_job(false);
        assert!(!job.can_retry());
        assert!(job.retry().is_err());
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[test]
    fn retry_rejected_for_non_failed_job() {
        let mut job = Job::new(
            Uuid::new_v4(),
            "data_extraction",
            "x",
            serde_json::Map::new(),
            3,
        );
        assert!(job.retry().is_err());
        job.transition_to(JobStatus::Running).unwrap();
        job.complete().unwrap();
        assert!(job.retry().is_err());
    }

    #[test]
    fn timeout_failures_are_distinguishable() {
        let mut job = Job::new(
            Uuid::new_v4(),
            "data_extraction",
            "x",
            serde_json::Map::new(),
            3,
        );
        job.transition_to(JobStatus::Running).unwrap();
        job.fail("timed out after 300s", FailureKind::Timeout, true)
            .unwrap();
        let failure = job.failure.as_ref().unwrap();
        assert_eq!(failure.kind, FailureKind::Timeout);
        assert!(failure.retryable);
        assert!(job.can_retry());
    }

    #[test]
    fn duration_requires_both_timestamps() {
        let mut job = Job::new(
            Uuid::new_v4(),
            "data_extraction",
            "x",
            serde_json::Map::new(),
            3,
        );
        assert!(job.duration().is_none());
        job.transition_to(JobStatus::Running).unwrap();
        assert!(job.duration().is_none());
        job.complete().unwrap();
        assert!(job.duration().is_some());
    }
}
