//! Persistence trait — single async interface for task, job, and result state.
//!
//! The orchestrator owns all mutation of a task's records; external callers
//! observe progress by reading through the same trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::job::Job;
use crate::result::AnalysisResult;
use crate::task::{Task, TaskStatus};

/// Backend-agnostic store covering tasks, jobs, and results.
#[async_trait]
pub trait Store: Send + Sync {
    // ── Tasks ───────────────────────────────────────────────────────

    async fn insert_task(&self, task: &Task) -> Result<(), StoreError>;

    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, StoreError>;

    /// Replace a task record. Errors if the task does not exist.
    async fn update_task(&self, task: &Task) -> Result<(), StoreError>;

    /// Replace a task record only while its stored status is one of
    /// `expected`. Returns false (and changes nothing) otherwise, so a
    /// finalization or progress write can never overwrite a terminal state
    /// that another writer committed in the meantime.
    async fn update_task_if(
        &self,
        task: &Task,
        expected: &[TaskStatus],
    ) -> Result<bool, StoreError>;

    /// Tasks for an owner, most recent first.
    async fn list_tasks_for_owner(&self, owner: &str) -> Result<Vec<Task>, StoreError>;

    // ── Jobs ────────────────────────────────────────────────────────

    async fn insert_job(&self, job: &Job) -> Result<(), StoreError>;

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>, StoreError>;

    /// Replace a job record. Errors if the job does not exist.
    async fn update_job(&self, job: &Job) -> Result<(), StoreError>;

    /// All jobs of a task, in creation order.
    async fn jobs_for_task(&self, task_id: Uuid) -> Result<Vec<Job>, StoreError>;

    /// Conditional queued→running transition — the single-writer dispatch
    /// gate. Returns false (and changes nothing) when the job is not queued,
    /// so a job can never be dispatched twice or started after cancellation.
    async fn try_mark_job_running(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Replace a running job's record with its settled state. Returns false
    /// (and changes nothing) when the job is no longer running, so a
    /// settlement can never overwrite a cancellation that landed while the
    /// agent was in flight.
    async fn try_settle_job(&self, job: &Job) -> Result<bool, StoreError>;

    /// Bulk-transition every queued or running job of a task to cancelled.
    /// Returns the cancelled jobs.
    async fn cancel_open_jobs(
        &self,
        task_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Vec<Job>, StoreError>;

    // ── Results ─────────────────────────────────────────────────────

    /// Append a result. Results are write-once: a second insert for the same
    /// (job, attempt) is a constraint violation.
    async fn insert_result(&self, result: &AnalysisResult) -> Result<(), StoreError>;

    async fn result_for_job(
        &self,
        job_id: Uuid,
        attempt: u32,
    ) -> Result<Option<AnalysisResult>, StoreError>;

    /// All results of a task, in creation order.
    async fn results_for_task(&self, task_id: Uuid) -> Result<Vec<AnalysisResult>, StoreError>;
}
