//! In-memory store backend, for tests and embedded use.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::job::{Job, JobStatus};
use crate::result::AnalysisResult;
use crate::store::traits::Store;
use crate::task::{Task, TaskStatus};

/// HashMap-backed store. All maps share one lock; contention is irrelevant
/// at the scale this backend is meant for.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    tasks: HashMap<Uuid, Task>,
    jobs: HashMap<Uuid, Job>,
    results: Vec<AnalysisResult>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_task(&self, task: &Task) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.tasks.contains_key(&task.id) {
            return Err(StoreError::Constraint(format!(
                "task {} already exists",
                task.id
            )));
        }
        inner.tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, StoreError> {
        Ok(self.inner.read().await.tasks.get(&id).cloned())
    }

    async fn update_task(&self, task: &Task) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        match inner.tasks.get_mut(&task.id) {
            Some(slot) => {
                *slot = task.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound {
                entity: "task",
                id: task.id.to_string(),
            }),
        }
    }

    async fn update_task_if(
        &self,
        task: &Task,
        expected: &[TaskStatus],
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        match inner.tasks.get_mut(&task.id) {
            Some(slot) if expected.contains(&slot.status) => {
                *slot = task.clone();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound {
                entity: "task",
                id: task.id.to_string(),
            }),
        }
    }

    async fn list_tasks_for_owner(&self, owner: &str) -> Result<Vec<Task>, StoreError> {
        let inner = self.inner.read().await;
        let mut tasks: Vec<Task> = inner
            .tasks
            .values()
            .filter(|t| t.owner == owner)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tasks)
    }

    async fn insert_job(&self, job: &Job) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.jobs.contains_key(&job.id) {
            return Err(StoreError::Constraint(format!(
                "job {} already exists",
                job.id
            )));
        }
        inner.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        Ok(self.inner.read().await.jobs.get(&id).cloned())
    }

    async fn update_job(&self, job: &Job) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        match inner.jobs.get_mut(&job.id) {
            Some(slot) => {
                *slot = job.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound {
                entity: "job",
                id: job.id.to_string(),
            }),
        }
    }

    async fn jobs_for_task(&self, task_id: Uuid) -> Result<Vec<Job>, StoreError> {
        let inner = self.inner.read().await;
        let mut jobs: Vec<Job> = inner
            .jobs
            .values()
            .filter(|j| j.task_id == task_id)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(jobs)
    }

    async fn try_mark_job_running(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        match inner.jobs.get_mut(&id) {
            Some(job) if job.status == JobStatus::Queued => {
                job.status = JobStatus::Running;
                job.started_at = Some(at);
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound {
                entity: "job",
                id: id.to_string(),
            }),
        }
    }

    async fn try_settle_job(&self, job: &Job) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        match inner.jobs.get_mut(&job.id) {
            Some(slot) if slot.status == JobStatus::Running => {
                *slot = job.clone();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound {
                entity: "job",
                id: job.id.to_string(),
            }),
        }
    }

    async fn cancel_open_jobs(
        &self,
        task_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Vec<Job>, StoreError> {
        let mut inner = self.inner.write().await;
        let mut cancelled = Vec::new();
        for job in inner.jobs.values_mut() {
            if job.task_id == task_id
                && matches!(job.status, JobStatus::Queued | JobStatus::Running)
            {
                job.status = JobStatus::Cancelled;
                job.completed_at = Some(at);
                cancelled.push(job.clone());
            }
        }
        cancelled.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(cancelled)
    }

    async fn insert_result(&self, result: &AnalysisResult) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner
            .results
            .iter()
            .any(|r| r.job_id == result.job_id && r.attempt == result.attempt)
        {
            return Err(StoreError::Constraint(format!(
                "result for job {} attempt {} already recorded",
                result.job_id, result.attempt
            )));
        }
        inner.results.push(result.clone());
        Ok(())
    }

    async fn result_for_job(
        &self,
        job_id: Uuid,
        attempt: u32,
    ) -> Result<Option<AnalysisResult>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .results
            .iter()
            .find(|r| r.job_id == job_id && r.attempt == attempt)
            .cloned())
    }

    async fn results_for_task(&self, task_id: Uuid) -> Result<Vec<AnalysisResult>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .results
            .iter()
            .filter(|r| r.task_id == task_id)
            .cloned()
            .collect())
    }
}
