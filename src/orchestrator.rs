//! Orchestration core: fan-out, per-job isolation, fan-in, report synthesis.
//!
//! One orchestration run drives a task from `pending` to a terminal state.
//! All selected agents run concurrently, each inside its own bulkhead: a
//! per-job timeout plus per-job settlement, so one slow or failing agent
//! never takes the task down with it. Only a failure of the shared
//! orchestration logic itself (`OrchestrationError`) fails the task.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agents::{AgentRegistry, merge_parameters};
use crate::aggregator::{self, Report};
use crate::audit::{AuditEvent, AuditStream};
use crate::config::OrchestratorConfig;
use crate::error::{AgentError, Error, JobError, OrchestrationError, Result, ValidationError};
use crate::job::{FailureKind, Job, JobStatus};
use crate::result::{AnalysisResult, Provenance};
use crate::store::Store;
use crate::task::TaskStatus;

/// How an orchestration run ended.
#[derive(Debug)]
pub enum Outcome {
    /// All jobs settled and a report was synthesized, possibly from partial
    /// results.
    Completed(Report),
    /// The task was cancelled while jobs were in flight.
    Cancelled,
}

/// Drives tasks through dispatch, settlement, and report synthesis.
pub struct Orchestrator {
    config: OrchestratorConfig,
    registry: Arc<AgentRegistry>,
    store: Arc<dyn Store>,
    audit: AuditStream,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        registry: Arc<AgentRegistry>,
        store: Arc<dyn Store>,
        audit: AuditStream,
    ) -> Self {
        Self {
            config,
            registry,
            store,
            audit,
        }
    }

    /// Validate an agent selection against the registry and the input.
    /// Raised before any job exists, so a rejected selection has no side
    /// effects.
    pub fn validate_selection(
        &self,
        agent_types: &[String],
        input: &str,
    ) -> std::result::Result<(), ValidationError> {
        if agent_types.is_empty() {
            return Err(ValidationError::NoAgentsSelected);
        }
        for agent_type in agent_types {
            let agent = self.registry.get(agent_type).ok_or_else(|| {
                ValidationError::UnknownAgentType {
                    agent_type: agent_type.clone(),
                }
            })?;
            let max = agent.capabilities().max_input_size;
            if input.len() > max {
                return Err(ValidationError::InputTooLarge {
                    agent_type: agent_type.clone(),
                    size: input.len(),
                    max,
                });
            }
        }
        Ok(())
    }

    /// Run a pending task to a terminal state.
    ///
    /// `input` is the resolved content behind the task's `input_ref`; each
    /// job gets its own snapshot of it.
    pub async fn orchestrate(&self, task_id: Uuid, input: String) -> Result<Outcome> {
        let mut task = self
            .store
            .get_task(task_id)
            .await?
            .ok_or(OrchestrationError::TaskNotFound { id: task_id })?;

        if task.status != TaskStatus::Pending {
            return Err(OrchestrationError::InvalidTaskState {
                id: task_id,
                status: task.status.to_string(),
                expected: "pending".into(),
            }
            .into());
        }

        self.validate_selection(&task.agent_types, &input)?;

        task.transition_to(TaskStatus::Running)
            .map_err(|_| OrchestrationError::InvalidTaskState {
                id: task_id,
                status: task.status.to_string(),
                expected: "pending".into(),
            })?;
        if !self
            .store
            .update_task_if(&task, &[TaskStatus::Pending])
            .await?
        {
            info!(%task_id, "task cancelled before start");
            return Ok(Outcome::Cancelled);
        }
        self.audit.emit(AuditEvent::TaskStarted { task_id });
        info!(%task_id, agents = task.agent_types.len(), "orchestration started");

        // One job per selected agent, each with its own input snapshot and
        // effective parameters.
        let mut jobs = Vec::with_capacity(task.agent_types.len());
        for agent_type in &task.agent_types {
            let agent = self.registry.get(agent_type).ok_or_else(|| {
                ValidationError::UnknownAgentType {
                    agent_type: agent_type.clone(),
                }
            })?;
            let parameters = merge_parameters(agent.default_parameters(), &task.parameters);
            let job = Job::new(
                task_id,
                agent_type.clone(),
                input.clone(),
                parameters,
                self.config.max_job_retries,
            );
            self.store.insert_job(&job).await?;
            self.audit.emit(AuditEvent::JobCreated {
                task_id,
                job_id: job.id,
                agent_type: agent_type.clone(),
            });
            jobs.push(job);
        }

        let total = jobs.len();
        let settled = AtomicUsize::new(0);
        join_all(jobs.iter().map(|job| {
            let settled = &settled;
            async move {
                if let Err(e) = self.dispatch_job(job.id).await {
                    warn!(job_id = %job.id, error = %e, "job dispatch errored");
                }
                let done = settled.fetch_add(1, Ordering::SeqCst) + 1;
                if let Err(e) = self.record_progress(task_id, done, total).await {
                    warn!(%task_id, error = %e, "progress update failed");
                }
            }
        }))
        .await;

        // Fan-in. A cancel request may have landed while jobs were in
        // flight; its terminal state wins and no report is synthesized.
        let mut task = self
            .store
            .get_task(task_id)
            .await?
            .ok_or(OrchestrationError::TaskNotFound { id: task_id })?;
        if task.status == TaskStatus::Cancelled {
            info!(%task_id, "orchestration ended by cancellation");
            return Ok(Outcome::Cancelled);
        }

        let report = match self.synthesize_report(task_id).await {
            Ok(report) => report,
            // Only a failure of the shared orchestration logic fails the
            // task. Store errors propagate without settling it.
            Err(e @ Error::Orchestration(_)) => {
                let message = e.to_string();
                if task.fail(message.clone()).is_ok()
                    && self
                        .store
                        .update_task_if(&task, &[TaskStatus::Running])
                        .await?
                {
                    self.audit.emit(AuditEvent::TaskFailed {
                        task_id,
                        error: message,
                    });
                }
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        task.complete()
            .map_err(|_| OrchestrationError::InvalidTaskState {
                id: task_id,
                status: task.status.to_string(),
                expected: "running".into(),
            })?;
        // A cancel that committed during synthesis wins over completion.
        if !self
            .store
            .update_task_if(&task, &[TaskStatus::Running])
            .await?
        {
            info!(%task_id, "orchestration ended by cancellation");
            return Ok(Outcome::Cancelled);
        }
        self.audit.emit(AuditEvent::TaskCompleted {
            task_id,
            confidence: report.overall_confidence,
        });
        info!(%task_id, status = %report.status, confidence = report.overall_confidence, "orchestration completed");

        Ok(Outcome::Completed(report))
    }

    /// Dispatch one queued job and settle it.
    ///
    /// The conditional queued→running store transition is the single entry
    /// gate: a job that is already running, settled, or cancelled is left
    /// alone. Settlement is a second conditional transition, applied only
    /// while the job is still running, so a cancellation that landed during
    /// the agent call wins and the late result is discarded.
    pub async fn dispatch_job(&self, job_id: Uuid) -> Result<()> {
        let job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or(Error::Job(JobError::NotFound { id: job_id }))?;

        if !self.store.try_mark_job_running(job_id, Utc::now()).await? {
            debug!(%job_id, status = %job.status, "dispatch gate closed, skipping");
            return Ok(());
        }
        self.audit.emit(AuditEvent::JobStarted {
            job_id,
            agent_type: job.agent_type.clone(),
        });

        let started = Instant::now();
        let outcome = match self.registry.get(&job.agent_type) {
            Some(agent) => {
                // The timeout is the bulkhead wall. Dropping the future
                // aborts the in-flight agent call.
                match timeout(
                    self.config.job_timeout,
                    agent.process(&job.input, &job.parameters),
                )
                .await
                {
                    Ok(result) => result.map(|output| (output, agent.model())),
                    Err(_) => Err(AgentError::Generation(
                        crate::error::GenerationError::Timeout {
                            after: self.config.job_timeout,
                        },
                    )),
                }
            }
            None => Err(AgentError::Validation(ValidationError::UnknownAgentType {
                agent_type: job.agent_type.clone(),
            })),
        };
        let elapsed = started.elapsed();

        // Cancellation gate: a cancel that landed while the agent ran wins.
        let mut job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or(Error::Job(JobError::NotFound { id: job_id }))?;
        if job.status == JobStatus::Cancelled {
            debug!(%job_id, "job cancelled mid-flight, discarding late result");
            return Ok(());
        }

        match outcome {
            Ok((output, model)) => {
                job.complete().map_err(Error::Job)?;
                // Settlement is conditional on the job still running; a
                // cancel that won the race keeps its state and the late
                // result is discarded.
                if !self.store.try_settle_job(&job).await? {
                    debug!(%job_id, "job settled elsewhere, discarding late result");
                    return Ok(());
                }

                let result = AnalysisResult::success(
                    job.task_id,
                    job.id,
                    job.attempt(),
                    job.agent_type.as_str(),
                    output.title,
                    output.content,
                    output.structured,
                    output.confidence,
                    Provenance {
                        source_agent: job.agent_type.clone(),
                        model,
                        steps: output.steps,
                        processing_time: elapsed,
                    },
                );
                self.store.insert_result(&result).await?;
                self.audit.emit(AuditEvent::JobCompleted {
                    job_id,
                    agent_type: job.agent_type.clone(),
                    confidence: result.confidence,
                });
                debug!(%job_id, agent = %job.agent_type, confidence = result.confidence, "job completed");
            }
            Err(agent_err) => {
                let retryable = agent_err.is_retryable();
                let kind = match &agent_err {
                    AgentError::Generation(crate::error::GenerationError::Timeout { .. }) => {
                        FailureKind::Timeout
                    }
                    AgentError::Generation(_) => FailureKind::Generation,
                    _ => FailureKind::Agent,
                };
                let message = agent_err.to_string();

                job.fail(message.clone(), kind, retryable).map_err(Error::Job)?;
                if !self.store.try_settle_job(&job).await? {
                    debug!(%job_id, "job settled elsewhere, discarding late failure");
                    return Ok(());
                }

                let result = AnalysisResult::failure(
                    job.task_id,
                    job.id,
                    job.attempt(),
                    job.agent_type.as_str(),
                    message.clone(),
                    Provenance {
                        source_agent: job.agent_type.clone(),
                        model: None,
                        steps: Vec::new(),
                        processing_time: elapsed,
                    },
                );
                self.store.insert_result(&result).await?;
                self.audit.emit(AuditEvent::JobFailed {
                    job_id,
                    agent_type: job.agent_type.clone(),
                    error: message.clone(),
                    retryable,
                });
                warn!(%job_id, agent = %job.agent_type, error = %message, retryable, "job failed");
            }
        }

        Ok(())
    }

    /// Synthesize and persist the task's report from its latest per-job
    /// results.
    pub async fn synthesize_report(&self, task_id: Uuid) -> Result<Report> {
        let jobs = self.store.jobs_for_task(task_id).await?;
        let results = self.store.results_for_task(task_id).await?;

        // Latest attempt per job. Aggregated rows are not tied to a job and
        // drop out here by construction.
        let latest: Vec<AnalysisResult> = jobs
            .iter()
            .filter_map(|job| {
                results
                    .iter()
                    .filter(|r| r.job_id == job.id)
                    .max_by_key(|r| r.attempt)
                    .cloned()
            })
            .collect();

        let report = aggregator::aggregate(&latest).map_err(OrchestrationError::Aggregation)?;

        // Report serialization over plain data types cannot fail.
        let structured = match serde_json::to_value(&report) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        let row = AnalysisResult::aggregated(
            task_id,
            format!("Analysis report ({})", report.status),
            report.summary.clone(),
            structured,
            report.overall_confidence,
            Provenance {
                source_agent: "aggregator".into(),
                model: None,
                steps: vec!["collect_results".into(), "synthesize".into(), "score".into()],
                processing_time: report.total_processing_time(),
            },
            latest.iter().map(|r| r.id).collect(),
        );
        self.store.insert_result(&row).await?;

        Ok(report)
    }

    /// Record mid-run progress, capped below completion.
    async fn record_progress(&self, task_id: Uuid, settled: usize, total: usize) -> Result<()> {
        let mut task = match self.store.get_task(task_id).await? {
            Some(task) if task.status == TaskStatus::Running => task,
            _ => return Ok(()),
        };
        task.set_progress(((settled * 100) / total.max(1)) as u8);
        // Guarded write: a task settled since the read above keeps its state.
        self.store
            .update_task_if(&task, &[TaskStatus::Running])
            .await?;
        Ok(())
    }
}
