//! Task entity and status state machine.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, not yet picked up by the orchestrator.
    Pending,
    /// Orchestration in progress.
    Running,
    /// All jobs settled and the report was synthesized.
    Completed,
    /// The orchestration's own shared logic failed.
    Failed,
    /// Cancelled on external request.
    Cancelled,
}

impl TaskStatus {
    /// Check if this state allows transitioning to another state.
    ///
    /// Transitions are monotonic: there is no way out of a terminal state.
    /// Cancellation is only reachable while the task is still live.
    pub fn can_transition_to(&self, target: TaskStatus) -> bool {
        use TaskStatus::*;

        matches!(
            (self, target),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Task priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TaskPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

/// Terminal error recorded on a failed task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskErrorInfo {
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// A user-initiated unit of work: one input analyzed by a chosen agent set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    /// Owning user.
    pub owner: String,
    pub name: String,
    pub description: Option<String>,
    /// Immutable handle to the ingested content (resolved by a `ContentSource`).
    pub input_ref: String,
    /// Selected agent type identifiers. Never empty for a persisted task.
    pub agent_types: Vec<String>,
    /// Caller-supplied parameters, passed through to agents.
    pub parameters: serde_json::Map<String, serde_json::Value>,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    /// Completion percentage in [0, 100]. Reaches 100 only together with
    /// the transition to `Completed`.
    pub progress: u8,
    pub error: Option<TaskErrorInfo>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a new pending task.
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        input_ref: impl Into<String>,
        agent_types: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner: owner.into(),
            name: name.into(),
            description: None,
            input_ref: input_ref.into(),
            agent_types,
            parameters: serde_json::Map::new(),
            priority: TaskPriority::default(),
            status: TaskStatus::Pending,
            progress: 0,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Transition to a new status, updating timestamps.
    pub fn transition_to(&mut self, target: TaskStatus) -> Result<(), String> {
        if !self.status.can_transition_to(target) {
            return Err(format!(
                "Cannot transition task from {} to {}",
                self.status, target
            ));
        }
        self.status = target;
        match target {
            TaskStatus::Running if self.started_at.is_none() => {
                self.started_at = Some(Utc::now());
            }
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled => {
                self.completed_at = Some(Utc::now());
            }
            _ => {}
        }
        Ok(())
    }

    /// Record mid-run progress. Clamped to 99 so that 100 is only ever
    /// observable together with `Completed`.
    pub fn set_progress(&mut self, progress: u8) {
        self.progress = progress.min(99);
    }

    /// Finalize as completed: progress 100, completion timestamp set.
    pub fn complete(&mut self) -> Result<(), String> {
        self.transition_to(TaskStatus::Completed)?;
        self.progress = 100;
        Ok(())
    }

    /// Finalize as failed, capturing the orchestration error.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), String> {
        self.transition_to(TaskStatus::Failed)?;
        self.error = Some(TaskErrorInfo {
            message: message.into(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Wall-clock duration from start to completion, if both are recorded.
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
