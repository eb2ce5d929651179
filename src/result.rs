//! Analysis results: append-only outcome records, one per job attempt.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Quality tier derived from confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Low,
    Medium,
    High,
}

impl Quality {
    /// Tier thresholds: ≥ 0.9 high, ≥ 0.7 medium, otherwise low.
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.9 {
            Self::High
        } else if confidence >= 0.7 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        };
        write!(f, "{s}")
    }
}

/// Where a result came from and how it was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// Agent type that produced the result.
    pub source_agent: String,
    /// Model identifier, when generation was involved.
    pub model: Option<String>,
    /// Ordered processing steps.
    pub steps: Vec<String>,
    /// Time the agent spent processing.
    pub processing_time: Duration,
}

/// The outcome carried by a result. Failures are first-class so the
/// aggregator always sees one record per job, pattern-matching instead of
/// null-checking.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ResultOutcome {
    Success {
        title: String,
        content: String,
        /// Open passthrough payload; shape is agent-specific.
        structured: serde_json::Map<String, serde_json::Value>,
    },
    Failure {
        reason: String,
    },
}

impl ResultOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Persisted outcome of one job attempt. Written once when the job settles,
/// never mutated afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub id: Uuid,
    pub task_id: Uuid,
    pub job_id: Uuid,
    /// Which attempt of the job produced this record (0-based).
    pub attempt: u32,
    pub agent_type: String,
    pub outcome: ResultOutcome,
    /// Confidence in [0, 1]. Always 0 for failures.
    pub confidence: f64,
    pub quality: Quality,
    pub tags: Vec<String>,
    pub provenance: Provenance,
    /// Set on the synthesized report row, which links its per-job inputs.
    pub is_aggregated: bool,
    pub child_result_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl AnalysisResult {
    /// Record a successful job attempt.
    pub fn success(
        task_id: Uuid,
        job_id: Uuid,
        attempt: u32,
        agent_type: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
        structured: serde_json::Map<String, serde_json::Value>,
        confidence: f64,
        provenance: Provenance,
    ) -> Self {
        let confidence = confidence.clamp(0.0, 1.0);
        Self {
            id: Uuid::new_v4(),
            task_id,
            job_id,
            attempt,
            agent_type: agent_type.into(),
            outcome: ResultOutcome::Success {
                title: title.into(),
                content: content.into(),
                structured,
            },
            confidence,
            quality: Quality::from_confidence(confidence),
            tags: Vec::new(),
            provenance,
            is_aggregated: false,
            child_result_ids: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Record the synthesized report of a task. The row is not tied to a
    /// job; `job_id` mirrors the row's own id so per-attempt uniqueness
    /// still holds.
    pub fn aggregated(
        task_id: Uuid,
        title: impl Into<String>,
        content: impl Into<String>,
        structured: serde_json::Map<String, serde_json::Value>,
        confidence: f64,
        provenance: Provenance,
        child_result_ids: Vec<Uuid>,
    ) -> Self {
        let id = Uuid::new_v4();
        let confidence = confidence.clamp(0.0, 1.0);
        Self {
            id,
            task_id,
            job_id: id,
            attempt: 0,
            agent_type: "aggregator".into(),
            outcome: ResultOutcome::Success {
                title: title.into(),
                content: content.into(),
                structured,
            },
            confidence,
            quality: Quality::from_confidence(confidence),
            tags: Vec::new(),
            provenance,
            is_aggregated: true,
            child_result_ids,
            created_at: Utc::now(),
        }
    }

    /// Record a failed job attempt. Failures carry zero confidence so the
    /// aggregator sees a complete per-agent record set.
    pub fn failure(
        task_id: Uuid,
        job_id: Uuid,
        attempt: u32,
        agent_type: impl Into<String>,
        reason: impl Into<String>,
        provenance: Provenance,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            job_id,
            attempt,
            agent_type: agent_type.into(),
            outcome: ResultOutcome::Failure {
                reason: reason.into(),
            },
            confidence: 0.0,
            quality: Quality::Low,
            tags: Vec::new(),
            provenance,
            is_aggregated: false,
            child_result_ids: Vec::new(),
            created_at: Utc::now(),
        }
    }
}
