//! Task service: the crate's front door.
//!
//! Owns task creation, status reads, cancellation, explicit job retries, and
//! agent discovery. Orchestration itself runs in a background tokio task;
//! creation returns as soon as the task is persisted and callers observe
//! progress through `task_status` or the audit stream.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{error, info};
use uuid::Uuid;

use crate::agents::{AgentCapabilities, AgentRegistry};
use crate::audit::{AuditEvent, AuditRecord, AuditStream};
use crate::config::OrchestratorConfig;
use crate::error::{Error, JobError, OrchestrationError, Result, ValidationError};
use crate::job::Job;
use crate::orchestrator::Orchestrator;
use crate::result::AnalysisResult;
use crate::store::Store;
use crate::task::{Task, TaskPriority, TaskStatus};

/// Resolves an input reference to its ingested content.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Fetch the content behind a reference. `None` when the reference is
    /// unknown.
    async fn fetch(&self, input_ref: &str) -> Result<Option<String>>;
}

/// Map-backed content source, for tests and embedded use.
#[derive(Default)]
pub struct StaticContentSource {
    entries: HashMap<String, String>,
}

impl StaticContentSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, input_ref: impl Into<String>, content: impl Into<String>) -> Self {
        self.entries.insert(input_ref.into(), content.into());
        self
    }
}

#[async_trait]
impl ContentSource for StaticContentSource {
    async fn fetch(&self, input_ref: &str) -> Result<Option<String>> {
        Ok(self.entries.get(input_ref).cloned())
    }
}

/// Parameters for creating a task.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub owner: String,
    pub name: String,
    pub description: Option<String>,
    pub input_ref: String,
    pub agent_types: Vec<String>,
    pub parameters: serde_json::Map<String, serde_json::Value>,
    pub priority: TaskPriority,
}

impl NewTask {
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        input_ref: impl Into<String>,
        agent_types: Vec<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            description: None,
            input_ref: input_ref.into(),
            agent_types,
            parameters: serde_json::Map::new(),
            priority: TaskPriority::default(),
        }
    }
}

/// Full state of a task: the task record, its jobs, and its results.
#[derive(Debug, Clone)]
pub struct TaskView {
    pub task: Task,
    pub jobs: Vec<Job>,
    pub results: Vec<AnalysisResult>,
}

/// Front-door service over the orchestration core.
pub struct TaskService {
    orchestrator: Arc<Orchestrator>,
    store: Arc<dyn Store>,
    registry: Arc<AgentRegistry>,
    source: Arc<dyn ContentSource>,
    audit: AuditStream,
}

impl TaskService {
    pub fn new(
        config: OrchestratorConfig,
        registry: Arc<AgentRegistry>,
        store: Arc<dyn Store>,
        source: Arc<dyn ContentSource>,
    ) -> Self {
        let audit = AuditStream::new(config.audit_capacity);
        let orchestrator = Arc::new(Orchestrator::new(
            config,
            registry.clone(),
            store.clone(),
            audit.clone(),
        ));
        Self {
            orchestrator,
            store,
            registry,
            source,
            audit,
        }
    }

    /// Subscribe to audit events for all tasks handled by this service.
    pub fn subscribe(&self) -> broadcast::Receiver<AuditRecord> {
        self.audit.subscribe()
    }

    /// Create a task and start orchestrating it in the background.
    ///
    /// Validation happens before anything is persisted: a rejected request
    /// leaves no task behind. Returns the new task id immediately; the run
    /// proceeds asynchronously.
    pub async fn create_task(&self, new: NewTask) -> Result<Uuid> {
        let input = self
            .source
            .fetch(&new.input_ref)
            .await?
            .ok_or(ValidationError::InputNotFound {
                reference: new.input_ref.clone(),
            })?;
        self.orchestrator
            .validate_selection(&new.agent_types, &input)?;

        let mut task = Task::new(new.owner, new.name, new.input_ref, new.agent_types);
        task.description = new.description;
        task.parameters = new.parameters;
        task.priority = new.priority;
        self.store.insert_task(&task).await?;

        self.audit.emit(AuditEvent::TaskCreated {
            task_id: task.id,
            owner: task.owner.clone(),
            agent_types: task.agent_types.clone(),
        });
        info!(task_id = %task.id, owner = %task.owner, "task created");

        let orchestrator = self.orchestrator.clone();
        let task_id = task.id;
        tokio::spawn(async move {
            if let Err(e) = orchestrator.orchestrate(task_id, input).await {
                error!(%task_id, error = %e, "orchestration failed");
            }
        });

        Ok(task_id)
    }

    /// Task record with its jobs and results.
    pub async fn task_status(&self, task_id: Uuid) -> Result<TaskView> {
        let task = self
            .store
            .get_task(task_id)
            .await?
            .ok_or(OrchestrationError::TaskNotFound { id: task_id })?;
        let jobs = self.store.jobs_for_task(task_id).await?;
        let results = self.store.results_for_task(task_id).await?;
        Ok(TaskView {
            task,
            jobs,
            results,
        })
    }

    /// Cancel a live task. Every queued or running job is cancelled with it;
    /// settled jobs keep their state. Returns the number of cancelled jobs.
    pub async fn cancel_task(&self, task_id: Uuid) -> Result<usize> {
        let mut task = self
            .store
            .get_task(task_id)
            .await?
            .ok_or(OrchestrationError::TaskNotFound { id: task_id })?;

        if !matches!(task.status, TaskStatus::Pending | TaskStatus::Running) {
            return Err(OrchestrationError::InvalidTaskState {
                id: task_id,
                status: task.status.to_string(),
                expected: "pending or running".into(),
            }
            .into());
        }

        task.transition_to(TaskStatus::Cancelled)
            .map_err(|_| OrchestrationError::InvalidTaskState {
                id: task_id,
                status: task.status.to_string(),
                expected: "pending or running".into(),
            })?;
        // Conditional write: a completion that committed since the read
        // above keeps its terminal state and the cancel is rejected.
        if !self
            .store
            .update_task_if(&task, &[TaskStatus::Pending, TaskStatus::Running])
            .await?
        {
            let status = self
                .store
                .get_task(task_id)
                .await?
                .map(|t| t.status.to_string())
                .unwrap_or_else(|| "missing".into());
            return Err(OrchestrationError::InvalidTaskState {
                id: task_id,
                status,
                expected: "pending or running".into(),
            }
            .into());
        }

        let cancelled = self.store.cancel_open_jobs(task_id, Utc::now()).await?;
        for job in &cancelled {
            self.audit.emit(AuditEvent::JobCancelled {
                job_id: job.id,
                agent_type: job.agent_type.clone(),
            });
        }
        self.audit.emit(AuditEvent::TaskCancelled {
            task_id,
            cancelled_jobs: cancelled.len(),
        });
        info!(%task_id, cancelled = cancelled.len(), "task cancelled");

        Ok(cancelled.len())
    }

    /// Explicitly retry a failed job.
    ///
    /// Allowed only for failed jobs with a retryable failure and remaining
    /// budget, and only while the parent task can still receive results: a
    /// cancelled or failed task rejects the retry. The same job record is
    /// re-entered into dispatch; a fresh result is recorded for the new
    /// attempt. If the task had already completed, its report is
    /// re-synthesized from the updated results.
    pub async fn retry_job(&self, job_id: Uuid) -> Result<Job> {
        let mut job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or(Error::Job(JobError::NotFound { id: job_id }))?;

        let task = self
            .store
            .get_task(job.task_id)
            .await?
            .ok_or(OrchestrationError::TaskNotFound { id: job.task_id })?;
        if !matches!(task.status, TaskStatus::Running | TaskStatus::Completed) {
            return Err(OrchestrationError::InvalidTaskState {
                id: task.id,
                status: task.status.to_string(),
                expected: "running or completed".into(),
            }
            .into());
        }

        job.retry().map_err(Error::Job)?;
        self.store.update_job(&job).await?;
        info!(%job_id, attempt = job.attempt(), "job retry accepted");

        self.orchestrator.dispatch_job(job_id).await?;

        let job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or(Error::Job(JobError::NotFound { id: job_id }))?;

        let task = self
            .store
            .get_task(job.task_id)
            .await?
            .ok_or(OrchestrationError::TaskNotFound { id: job.task_id })?;
        if task.status == TaskStatus::Completed {
            let report = self.orchestrator.synthesize_report(task.id).await?;
            self.audit.emit(AuditEvent::TaskCompleted {
                task_id: task.id,
                confidence: report.overall_confidence,
            });
        }

        Ok(job)
    }

    /// Capability descriptors of all registered agents.
    pub fn list_available_agents(&self) -> Vec<AgentCapabilities> {
        self.registry.capabilities()
    }

    /// Tasks belonging to an owner, most recent first.
    pub async fn list_tasks(&self, owner: &str) -> Result<Vec<Task>> {
        Ok(self.store.list_tasks_for_owner(owner).await?)
    }
}
