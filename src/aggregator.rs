//! Report synthesis: one coherent report from all per-job results of a task.
//!
//! Aggregation is tolerant of partial failure by construction. Failed jobs
//! lower the report's status and leave gaps in its content, but never abort
//! synthesis; the only errors raised here are malformed result records, which
//! indicate a bug upstream rather than a failed analysis.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AggregationError;
use crate::result::{AnalysisResult, Quality, ResultOutcome};

/// Completeness of a synthesized report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    /// Every job contributed a successful result.
    Complete,
    /// At least one job succeeded and at least one failed.
    Partial,
    /// No job succeeded.
    Incomplete,
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Complete => "complete",
            Self::Partial => "partial",
            Self::Incomplete => "incomplete",
        };
        write!(f, "{s}")
    }
}

/// Per-agent line item in a report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentReportEntry {
    pub agent_type: String,
    pub succeeded: bool,
    pub confidence: f64,
    pub quality: Quality,
    /// Agent processing time, from the result's provenance.
    pub processing_time: Duration,
    /// Failure reason, when the job did not succeed.
    pub error: Option<String>,
}

/// The synthesized output of one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub status: ReportStatus,
    pub summary: String,
    pub key_findings: Vec<String>,
    /// Deduplicated, first occurrence wins.
    pub recommendations: Vec<String>,
    pub agents: Vec<AgentReportEntry>,
    /// Mean of the positive per-result confidences; exactly 0.5 when there
    /// are none, marking the report as pure uncertainty.
    pub overall_confidence: f64,
}

impl Report {
    /// Sum of the per-agent processing times.
    pub fn total_processing_time(&self) -> Duration {
        self.agents.iter().map(|a| a.processing_time).sum()
    }
}

/// Field names carrying findings and recommendations, per agent type.
/// Unknown agent types fall back to scanning all known field names.
fn content_fields(agent_type: &str) -> (&'static [&'static str], &'static [&'static str]) {
    match agent_type {
        "news_summarization" => (&["key_points"], &["recommendations"]),
        "data_extraction" => (&["entities"], &["follow_ups"]),
        "analyst_support" => (&["findings"], &["recommendations"]),
        _ => (
            &["key_points", "findings", "entities"],
            &["recommendations", "follow_ups"],
        ),
    }
}

fn string_items(
    structured: &serde_json::Map<String, serde_json::Value>,
    fields: &[&str],
) -> Vec<String> {
    let mut items = Vec::new();
    for field in fields {
        if let Some(serde_json::Value::Array(values)) = structured.get(*field) {
            items.extend(
                values
                    .iter()
                    .filter_map(|v| v.as_str())
                    .map(|s| s.to_string()),
            );
        }
    }
    items
}

fn check_confidence(result: &AnalysisResult) -> Result<f64, AggregationError> {
    let c = result.confidence;
    if !c.is_finite() || !(0.0..=1.0).contains(&c) {
        return Err(AggregationError::MalformedResult {
            result_id: result.id,
            reason: format!("confidence {c} outside [0, 1]"),
        });
    }
    Ok(c)
}

/// Synthesize a report from the per-job results of a task, one result per
/// job (the latest attempt). Input order is preserved in findings,
/// recommendations, and the agent list.
pub fn aggregate(results: &[AnalysisResult]) -> Result<Report, AggregationError> {
    let mut key_findings = Vec::new();
    let mut recommendations: Vec<String> = Vec::new();
    let mut agents = Vec::with_capacity(results.len());
    let mut success_titles = Vec::new();
    let mut succeeded = 0usize;
    let mut confidences = Vec::new();

    for result in results {
        let confidence = check_confidence(result)?;

        match &result.outcome {
            ResultOutcome::Success {
                title, structured, ..
            } => {
                let (finding_fields, rec_fields) = content_fields(&result.agent_type);
                key_findings.extend(string_items(structured, finding_fields));
                for rec in string_items(structured, rec_fields) {
                    if !recommendations.contains(&rec) {
                        recommendations.push(rec);
                    }
                }
                success_titles.push(format!("{}: {}", result.agent_type, title));
                succeeded += 1;
                if confidence > 0.0 {
                    confidences.push(confidence);
                }
                agents.push(AgentReportEntry {
                    agent_type: result.agent_type.clone(),
                    succeeded: true,
                    confidence,
                    quality: result.quality,
                    processing_time: result.provenance.processing_time,
                    error: None,
                });
            }
            ResultOutcome::Failure { reason } => {
                agents.push(AgentReportEntry {
                    agent_type: result.agent_type.clone(),
                    succeeded: false,
                    confidence: 0.0,
                    quality: Quality::Low,
                    processing_time: result.provenance.processing_time,
                    error: Some(reason.clone()),
                });
            }
        }
    }

    let status = if succeeded == results.len() && succeeded > 0 {
        ReportStatus::Complete
    } else if succeeded > 0 {
        ReportStatus::Partial
    } else {
        ReportStatus::Incomplete
    };

    let overall_confidence = if confidences.is_empty() {
        0.5
    } else {
        confidences.iter().sum::<f64>() / confidences.len() as f64
    };

    let mut summary = if succeeded == 0 {
        format!("No successful results from {} analyses.", results.len())
    } else {
        format!("{succeeded} of {} analyses succeeded.", results.len())
    };
    for title in &success_titles {
        summary.push_str("\n- ");
        summary.push_str(title);
    }

    Ok(Report {
        status,
        summary,
        key_findings,
        recommendations,
        agents,
        overall_confidence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::Provenance;
    use uuid::Uuid;

    fn provenance(millis: u64) -> Provenance {
        Provenance {
            source_agent: "test".into(),
            model: None,
            steps: vec!["generate".into()],
            processing_time: Duration::from_millis(millis),
        }
    }

    fn success(
        agent_type: &str,
        confidence: f64,
        structured: serde_json::Map<String, serde_json::Value>,
    ) -> AnalysisResult {
        AnalysisResult::success(
            Uuid::new_v4(),
            Uuid::new_v4(),
            0,
            agent_type,
            "Title",
            "content",
            structured,
            confidence,
            provenance(100),
        )
    }

    fn failure(agent_type: &str, reason: &str) -> AnalysisResult {
        AnalysisResult::failure(
            Uuid::new_v4(),
            Uuid::new_v4(),
            0,
            agent_type,
            reason,
            provenance(50),
        )
    }

    #[test]
    fn all_successes_make_a_complete_report() {
        let mut a = serde_json::Map::new();
        a.insert("key_points".into(), serde_json::json!(["p1", "p2"]));
        let mut b = serde_json::Map::new();
        b.insert("entities".into(), serde_json::json!(["Acme"]));

        let report = aggregate(&[
            success("news_summarization", 0.9, a),
            success("data_extraction", 0.7, b),
        ])
        .unwrap();

        assert_eq!(report.status, ReportStatus::Complete);
        assert_eq!(report.key_findings, vec!["p1", "p2", "Acme"]);
        assert!((report.overall_confidence - 0.8).abs() < 1e-9);
        assert_eq!(report.agents.len(), 2);
        assert_eq!(report.total_processing_time(), Duration::from_millis(200));
    }

    #[test]
    fn partial_failure_never_aborts_synthesis() {
        let mut a = serde_json::Map::new();
        a.insert("key_points".into(), serde_json::json!(["finding"]));

        let report = aggregate(&[
            success("news_summarization", 0.9, a),
            failure("data_extraction", "provider unavailable"),
        ])
        .unwrap();

        assert_eq!(report.status, ReportStatus::Partial);
        // Failures are excluded from the mean instead of dragging it down.
        assert_eq!(report.overall_confidence, 0.9);
        assert_eq!(report.key_findings, vec!["finding"]);
        let failed = &report.agents[1];
        assert!(!failed.succeeded);
        assert_eq!(failed.error.as_deref(), Some("provider unavailable"));
    }

    #[test]
    fn all_failures_yield_incomplete_with_neutral_confidence() {
        let report = aggregate(&[
            failure("news_summarization", "timeout"),
            failure("data_extraction", "auth"),
        ])
        .unwrap();

        assert_eq!(report.status, ReportStatus::Incomplete);
        assert_eq!(report.overall_confidence, 0.5);
        assert!(report.key_findings.is_empty());
        assert!(report.summary.starts_with("No successful results"));
    }

    #[test]
    fn recommendations_are_deduplicated_in_order() {
        let mut a = serde_json::Map::new();
        a.insert(
            "recommendations".into(),
            serde_json::json!(["verify sources", "archive"]),
        );
        let mut b = serde_json::Map::new();
        b.insert(
            "follow_ups".into(),
            serde_json::json!(["archive", "cross-check figures"]),
        );

        let report = aggregate(&[
            success("news_summarization", 0.9, a),
            success("data_extraction", 0.8, b),
        ])
        .unwrap();

        assert_eq!(
            report.recommendations,
            vec!["verify sources", "archive", "cross-check figures"]
        );
    }

    #[test]
    fn unknown_structured_fields_are_ignored() {
        let mut a = serde_json::Map::new();
        a.insert("key_points".into(), serde_json::json!(["kept"]));
        a.insert("surprise".into(), serde_json::json!({"nested": [1, 2]}));
        a.insert("entities".into(), serde_json::json!(["not a summarizer field"]));

        let report = aggregate(&[success("news_summarization", 0.9, a)]).unwrap();
        assert_eq!(report.key_findings, vec!["kept"]);
    }

    #[test]
    fn analyst_fields_map_into_the_report() {
        let mut a = serde_json::Map::new();
        a.insert(
            "findings".into(),
            serde_json::json!(["margin pressure building"]),
        );
        a.insert(
            "recommendations".into(),
            serde_json::json!(["hedge rate exposure"]),
        );

        let report = aggregate(&[success("analyst_support", 0.85, a)]).unwrap();
        assert_eq!(report.key_findings, vec!["margin pressure building"]);
        assert_eq!(report.recommendations, vec!["hedge rate exposure"]);
    }

    #[test]
    fn unknown_agent_type_falls_back_to_generic_fields() {
        let mut a = serde_json::Map::new();
        a.insert("findings".into(), serde_json::json!(["f1"]));
        a.insert("follow_ups".into(), serde_json::json!(["r1"]));

        let report = aggregate(&[success("sentiment_analysis", 0.75, a)]).unwrap();
        assert_eq!(report.key_findings, vec!["f1"]);
        assert_eq!(report.recommendations, vec!["r1"]);
    }

    #[test]
    fn zero_confidence_successes_do_not_skew_the_mean() {
        let report = aggregate(&[
            success("news_summarization", 0.0, serde_json::Map::new()),
            success("data_extraction", 0.8, serde_json::Map::new()),
        ])
        .unwrap();
        assert_eq!(report.status, ReportStatus::Complete);
        assert_eq!(report.overall_confidence, 0.8);

        // No positive confidence at all falls back to pure uncertainty.
        let report = aggregate(&[success(
            "news_summarization",
            0.0,
            serde_json::Map::new(),
        )])
        .unwrap();
        assert_eq!(report.overall_confidence, 0.5);
    }

    #[test]
    fn corrupt_confidence_is_an_aggregation_error() {
        let mut result = success("news_summarization", 0.9, serde_json::Map::new());
        result.confidence = f64::NAN;

        let err = aggregate(&[result]).unwrap_err();
        assert!(matches!(err, AggregationError::MalformedResult { .. }));
    }

    #[test]
    fn empty_input_is_incomplete() {
        let report = aggregate(&[]).unwrap();
        assert_eq!(report.status, ReportStatus::Incomplete);
        assert_eq!(report.overall_confidence, 0.5);
        assert!(report.summary.starts_with("No successful results"));
    }
}
