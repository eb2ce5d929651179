//! libSQL backend — async `Store` trait implementation.
//!
//! Supports local file and in-memory databases. Entities are serialized to a
//! JSON `data` column; status/identity columns are maintained alongside for
//! queries and for the conditional-update dispatch gate.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::info;
use uuid::Uuid;

use crate::error::StoreError;
use crate::job::{Job, JobStatus};
use crate::result::AnalysisResult;
use crate::store::migrations;
use crate::store::traits::Store;
use crate::task::{Task, TaskStatus};

/// libSQL store backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Backend(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Backend(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to create in-memory database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Backend(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        for statement in migrations::SCHEMA {
            self.conn
                .execute(statement, ())
                .await
                .map_err(|e| StoreError::Backend(format!("Migration failed: {e}")))?;
        }
        Ok(())
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

fn to_json<T: Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn from_json<T: DeserializeOwned>(data: &str) -> Result<T, StoreError> {
    serde_json::from_str(data).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn map_exec_error(e: libsql::Error) -> StoreError {
    let message = e.to_string();
    if message.contains("UNIQUE") {
        StoreError::Constraint(message)
    } else {
        StoreError::Backend(message)
    }
}

/// Read the `data` column of every row into an entity.
async fn collect_rows<T: DeserializeOwned>(
    mut rows: libsql::Rows,
) -> Result<Vec<T>, StoreError> {
    let mut items = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?
    {
        let data: String = row
            .get(0)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        items.push(from_json(&data)?);
    }
    Ok(items)
}

#[async_trait]
impl Store for LibSqlStore {
    async fn insert_task(&self, task: &Task) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "INSERT INTO tasks (id, owner, status, created_at, data)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    task.id.to_string(),
                    task.owner.clone(),
                    task.status.to_string(),
                    task.created_at.to_rfc3339(),
                    to_json(task)?,
                ],
            )
            .await
            .map_err(map_exec_error)?;
        Ok(())
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, StoreError> {
        let rows = self
            .conn()
            .query(
                "SELECT data FROM tasks WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(collect_rows(rows).await?.into_iter().next())
    }

    async fn update_task(&self, task: &Task) -> Result<(), StoreError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE tasks SET status = ?2, data = ?3 WHERE id = ?1",
                params![
                    task.id.to_string(),
                    task.status.to_string(),
                    to_json(task)?,
                ],
            )
            .await
            .map_err(map_exec_error)?;
        if affected == 0 {
            return Err(StoreError::NotFound {
                entity: "task",
                id: task.id.to_string(),
            });
        }
        Ok(())
    }

    async fn update_task_if(
        &self,
        task: &Task,
        expected: &[TaskStatus],
    ) -> Result<bool, StoreError> {
        if expected.is_empty() {
            return Ok(false);
        }
        // Status values are fixed enum strings, safe to inline.
        let statuses = expected
            .iter()
            .map(|s| format!("'{s}'"))
            .collect::<Vec<_>>()
            .join(", ");
        let affected = self
            .conn()
            .execute(
                &format!(
                    "UPDATE tasks SET status = ?2, data = ?3
                     WHERE id = ?1 AND status IN ({statuses})"
                ),
                params![
                    task.id.to_string(),
                    task.status.to_string(),
                    to_json(task)?,
                ],
            )
            .await
            .map_err(map_exec_error)?;
        if affected == 0 {
            return match self.get_task(task.id).await? {
                Some(_) => Ok(false),
                None => Err(StoreError::NotFound {
                    entity: "task",
                    id: task.id.to_string(),
                }),
            };
        }
        Ok(true)
    }

    async fn list_tasks_for_owner(&self, owner: &str) -> Result<Vec<Task>, StoreError> {
        let rows = self
            .conn()
            .query(
                "SELECT data FROM tasks WHERE owner = ?1 ORDER BY created_at DESC",
                params![owner],
            )
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        collect_rows(rows).await
    }

    async fn insert_job(&self, job: &Job) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "INSERT INTO jobs (id, task_id, status, created_at, data)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    job.id.to_string(),
                    job.task_id.to_string(),
                    job.status.to_string(),
                    job.created_at.to_rfc3339(),
                    to_json(job)?,
                ],
            )
            .await
            .map_err(map_exec_error)?;
        Ok(())
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        let rows = self
            .conn()
            .query(
                "SELECT data FROM jobs WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(collect_rows(rows).await?.into_iter().next())
    }

    async fn update_job(&self, job: &Job) -> Result<(), StoreError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE jobs SET status = ?2, data = ?3 WHERE id = ?1",
                params![job.id.to_string(), job.status.to_string(), to_json(job)?],
            )
            .await
            .map_err(map_exec_error)?;
        if affected == 0 {
            return Err(StoreError::NotFound {
                entity: "job",
                id: job.id.to_string(),
            });
        }
        Ok(())
    }

    async fn jobs_for_task(&self, task_id: Uuid) -> Result<Vec<Job>, StoreError> {
        let rows = self
            .conn()
            .query(
                "SELECT data FROM jobs WHERE task_id = ?1 ORDER BY created_at",
                params![task_id.to_string()],
            )
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        collect_rows(rows).await
    }

    async fn try_mark_job_running(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        // The conditional status-column update is the atomic gate; the JSON
        // blob is refreshed afterwards to match.
        let claimed = self
            .conn()
            .execute(
                "UPDATE jobs SET status = 'running' WHERE id = ?1 AND status = 'queued'",
                params![id.to_string()],
            )
            .await
            .map_err(map_exec_error)?;
        if claimed == 0 {
            return match self.get_job(id).await? {
                Some(_) => Ok(false),
                None => Err(StoreError::NotFound {
                    entity: "job",
                    id: id.to_string(),
                }),
            };
        }

        let mut job = self.get_job(id).await?.ok_or(StoreError::NotFound {
            entity: "job",
            id: id.to_string(),
        })?;
        job.status = JobStatus::Running;
        job.started_at = Some(at);
        self.update_job(&job).await?;
        Ok(true)
    }

    async fn try_settle_job(&self, job: &Job) -> Result<bool, StoreError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE jobs SET status = ?2, data = ?3
                 WHERE id = ?1 AND status = 'running'",
                params![job.id.to_string(), job.status.to_string(), to_json(job)?],
            )
            .await
            .map_err(map_exec_error)?;
        if affected == 0 {
            return match self.get_job(job.id).await? {
                Some(_) => Ok(false),
                None => Err(StoreError::NotFound {
                    entity: "job",
                    id: job.id.to_string(),
                }),
            };
        }
        Ok(true)
    }

    async fn cancel_open_jobs(
        &self,
        task_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Vec<Job>, StoreError> {
        let open = self
            .jobs_for_task(task_id)
            .await?
            .into_iter()
            .filter(|j| matches!(j.status, JobStatus::Queued | JobStatus::Running));

        let mut cancelled = Vec::new();
        for mut job in open {
            job.status = JobStatus::Cancelled;
            job.completed_at = Some(at);
            self.update_job(&job).await?;
            cancelled.push(job);
        }
        Ok(cancelled)
    }

    async fn insert_result(&self, result: &AnalysisResult) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "INSERT INTO results (id, task_id, job_id, attempt, created_at, data)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    result.id.to_string(),
                    result.task_id.to_string(),
                    result.job_id.to_string(),
                    result.attempt as i64,
                    result.created_at.to_rfc3339(),
                    to_json(result)?,
                ],
            )
            .await
            .map_err(map_exec_error)?;
        Ok(())
    }

    async fn result_for_job(
        &self,
        job_id: Uuid,
        attempt: u32,
    ) -> Result<Option<AnalysisResult>, StoreError> {
        let rows = self
            .conn()
            .query(
                "SELECT data FROM results WHERE job_id = ?1 AND attempt = ?2",
                params![job_id.to_string(), attempt as i64],
            )
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(collect_rows(rows).await?.into_iter().next())
    }

    async fn results_for_task(&self, task_id: Uuid) -> Result<Vec<AnalysisResult>, StoreError> {
        let rows = self
            .conn()
            .query(
                "SELECT data FROM results WHERE task_id = ?1 ORDER BY created_at",
                params![task_id.to_string()],
            )
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        collect_rows(rows).await
    }
}
