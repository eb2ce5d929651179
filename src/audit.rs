//! Audit event stream — fire-and-forget notifications on state transitions.
//!
//! Events are broadcast to any connected subscriber (notification collaborator,
//! log shipper, test harness). Emission never blocks orchestration and a
//! missing subscriber is not an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// One audit event per significant task/job transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    TaskCreated {
        task_id: Uuid,
        owner: String,
        agent_types: Vec<String>,
    },
    TaskStarted {
        task_id: Uuid,
    },
    TaskCompleted {
        task_id: Uuid,
        /// Overall report confidence.
        confidence: f64,
    },
    TaskFailed {
        task_id: Uuid,
        error: String,
    },
    TaskCancelled {
        task_id: Uuid,
        cancelled_jobs: usize,
    },
    JobCreated {
        task_id: Uuid,
        job_id: Uuid,
        agent_type: String,
    },
    JobStarted {
        job_id: Uuid,
        agent_type: String,
    },
    JobCompleted {
        job_id: Uuid,
        agent_type: String,
        confidence: f64,
    },
    JobFailed {
        job_id: Uuid,
        agent_type: String,
        error: String,
        retryable: bool,
    },
    JobCancelled {
        job_id: Uuid,
        agent_type: String,
    },
}

/// An audit event with its emission timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub event: AuditEvent,
    pub timestamp: DateTime<Utc>,
}

/// Broadcast-backed audit stream.
#[derive(Debug, Clone)]
pub struct AuditStream {
    tx: broadcast::Sender<AuditRecord>,
}

impl AuditStream {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit an event. Send errors (no live subscriber) are ignored.
    pub fn emit(&self, event: AuditEvent) {
        tracing::debug!(event = ?event, "audit");
        let _ = self.tx.send(AuditRecord {
            event,
            timestamp: Utc::now(),
        });
    }

    /// Subscribe to the stream.
    pub fn subscribe(&self) -> broadcast::Receiver<AuditRecord> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emit_without_subscribers_is_a_noop() {
        let stream = AuditStream::new(16);
        stream.emit(AuditEvent::TaskStarted {
            task_id: Uuid::new_v4(),
        });
    }

    #[tokio::test]
    async fn subscriber_receives_events_in_order() {
        let stream = AuditStream::new(16);
        let mut rx = stream.subscribe();
        let task_id = Uuid::new_v4();

        stream.emit(AuditEvent::TaskStarted { task_id });
        stream.emit(AuditEvent::TaskCompleted {
            task_id,
            confidence: 0.9,
        });

        let first = rx.recv().await.unwrap();
        assert!(matches!(first.event, AuditEvent::TaskStarted { .. }));
        let second = rx.recv().await.unwrap();
        assert!(matches!(second.event, AuditEvent::TaskCompleted { .. }));
    }
}
