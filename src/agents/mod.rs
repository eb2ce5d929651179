//! Pluggable analysis agents.
//!
//! An agent is a polymorphic capability `process(input, parameters) -> output`.
//! Variants differ only in prompt and output schema; control flow, parameter
//! validation, retry, and output parsing are shared. The orchestrator looks
//! agents up in an `AgentRegistry` built once at startup and never branches on
//! type strings.

pub mod analyst;
pub mod extraction;
pub mod summarization;

pub use analyst::AnalystSupportAgent;
pub use extraction::DataExtractionAgent;
pub use summarization::SummarizationAgent;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, ValidationError};

/// Capability descriptor, consumed by the orchestrator for pre-dispatch
/// validation and exposed through agent discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCapabilities {
    pub agent_type: String,
    /// Parameter modes the agent understands (e.g. summary types).
    pub parameter_modes: Vec<String>,
    pub input_types: Vec<String>,
    pub output_types: Vec<String>,
    /// Maximum input size in bytes.
    pub max_input_size: usize,
    /// Rough processing time estimate for callers.
    pub estimated_duration: Duration,
    pub version: String,
}

/// Output of a successful agent run.
#[derive(Debug, Clone)]
pub struct AgentOutput {
    pub title: String,
    /// Human-readable text content.
    pub content: String,
    /// Agent-specific structured payload, passed through opaquely.
    pub structured: serde_json::Map<String, serde_json::Value>,
    /// Self-reported confidence in [0, 1].
    pub confidence: f64,
    /// Ordered processing steps for provenance.
    pub steps: Vec<String>,
}

/// A pluggable analysis capability.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Registry key.
    fn agent_type(&self) -> &str;

    fn capabilities(&self) -> AgentCapabilities;

    /// Model identifier used for generation, recorded in provenance.
    fn model(&self) -> Option<String> {
        None
    }

    /// Parameter keys that must be present and non-null.
    fn required_parameters(&self) -> &[&str] {
        &[]
    }

    /// Seed parameters merged under caller-supplied values.
    fn default_parameters(&self) -> serde_json::Map<String, serde_json::Value> {
        serde_json::Map::new()
    }

    /// Run the analysis.
    async fn process(
        &self,
        input: &str,
        parameters: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<AgentOutput, AgentError>;
}

/// Check that every required key is present and non-null. Raised before any
/// generation call is made.
pub fn validate_parameters(
    agent_type: &str,
    parameters: &serde_json::Map<String, serde_json::Value>,
    required: &[&str],
) -> Result<(), ValidationError> {
    let missing: Vec<String> = required
        .iter()
        .filter(|key| {
            !parameters
                .get(**key)
                .is_some_and(|v| !v.is_null())
        })
        .map(|key| key.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::MissingParameters {
            agent_type: agent_type.to_string(),
            missing,
        })
    }
}

/// Registry of available agents, keyed by agent type. Built once, then
/// read-only.
pub struct AgentRegistry {
    agents: HashMap<String, Arc<dyn Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            agents: HashMap::new(),
        }
    }

    /// Register an agent under its declared type.
    pub fn register(&mut self, agent: Arc<dyn Agent>) {
        let key = agent.agent_type().to_string();
        tracing::debug!("Registered agent: {}", key);
        self.agents.insert(key, agent);
    }

    pub fn get(&self, agent_type: &str) -> Option<Arc<dyn Agent>> {
        self.agents.get(agent_type).cloned()
    }

    pub fn has(&self, agent_type: &str) -> bool {
        self.agents.contains_key(agent_type)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Capability descriptors of all registered agents, sorted by type for
    /// stable discovery output.
    pub fn capabilities(&self) -> Vec<AgentCapabilities> {
        let mut all: Vec<AgentCapabilities> =
            self.agents.values().map(|a| a.capabilities()).collect();
        all.sort_by(|a, b| a.agent_type.cmp(&b.agent_type));
        all
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Best-effort salvage of structured output: find the largest balanced
/// `{…}` substring, honoring strings and escapes. Used once per agent run
/// before failing hard on malformed model output.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut best: Option<(usize, usize)> = None;
    let mut start: Option<usize> = None;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' if depth > 0 => in_string = true,
            b'{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            b'}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    let s = start.take().unwrap_or(i);
                    let candidate = (s, i + 1);
                    if best.is_none_or(|(bs, be)| candidate.1 - candidate.0 > be - bs) {
                        best = Some(candidate);
                    }
                }
            }
            _ => {}
        }
    }

    best.map(|(s, e)| &text[s..e])
}

/// Parse the model's answer as a JSON object, salvaging an embedded object
/// from surrounding prose if the whole answer does not parse.
pub fn parse_structured_output(
    agent_type: &str,
    raw: &str,
) -> Result<serde_json::Map<String, serde_json::Value>, AgentError> {
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str(raw.trim()) {
        return Ok(map);
    }

    let salvaged = extract_json_object(raw).ok_or_else(|| AgentError::MalformedOutput {
        agent_type: agent_type.to_string(),
        reason: "no JSON object in model output".to_string(),
    })?;

    match serde_json::from_str(salvaged) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        _ => Err(AgentError::MalformedOutput {
            agent_type: agent_type.to_string(),
            reason: "salvaged block is not a JSON object".to_string(),
        }),
    }
}

/// Read an f64 confidence out of a structured payload, clamped to [0, 1].
pub(crate) fn read_confidence(
    structured: &serde_json::Map<String, serde_json::Value>,
    default: f64,
) -> f64 {
    structured
        .get("confidence")
        .and_then(|v| v.as_f64())
        .unwrap_or(default)
        .clamp(0.0, 1.0)
}

/// Merge caller parameters over agent defaults.
pub(crate) fn merge_parameters(
    defaults: serde_json::Map<String, serde_json::Value>,
    caller: &serde_json::Map<String, serde_json::Value>,
) -> serde_json::Map<String, serde_json::Value> {
    let mut merged = defaults;
    for (k, v) in caller {
        merged.insert(k.clone(), v.clone());
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerationError;
    use crate::llm::{GenerationProvider, GenerationRequest, GenerationResponse};

    /// Scripted provider double.
    pub(crate) struct StaticProvider {
        pub reply: String,
    }

    #[async_trait]
    impl GenerationProvider for StaticProvider {
        fn model_name(&self) -> &str {
            "static-test-model"
        }

        async fn generate(
            &self,
            _request: GenerationRequest,
        ) -> Result<GenerationResponse, GenerationError> {
            Ok(GenerationResponse {
                content: self.reply.clone(),
            })
        }
    }

    #[test]
    fn registry_lookup_by_key() {
        let provider = Arc::new(StaticProvider {
            reply: "{}".into(),
        });
        let mut registry = AgentRegistry::new();
        registry.register(Arc::new(SummarizationAgent::new(
            provider.clone(),
            crate::llm::RetryPolicy::default(),
        )));
        registry.register(Arc::new(DataExtractionAgent::new(
            provider.clone(),
            crate::llm::RetryPolicy::default(),
        )));
        registry.register(Arc::new(AnalystSupportAgent::new(
            provider,
            crate::llm::RetryPolicy::default(),
        )));

        assert_eq!(registry.len(), 3);
        assert!(registry.has("news_summarization"));
        assert!(registry.has("data_extraction"));
        assert!(registry.has("analyst_support"));
        assert!(registry.get("recommender").is_none());

        let caps = registry.capabilities();
        assert_eq!(caps[0].agent_type, "analyst_support");
        assert_eq!(caps[1].agent_type, "data_extraction");
        assert_eq!(caps[2].agent_type, "news_summarization");
    }

    #[test]
    fn validate_parameters_reports_all_missing_keys() {
        let mut params = serde_json::Map::new();
        params.insert("present".into(), serde_json::json!("x"));
        params.insert("null_value".into(), serde_json::Value::Null);

        let err = validate_parameters("test_agent", &params, &["present", "null_value", "absent"])
            .unwrap_err();
        match err {
            ValidationError::MissingParameters { missing, .. } => {
                assert_eq!(missing, vec!["null_value".to_string(), "absent".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn extract_json_object_finds_largest_block() {
        let text = r#"Here you go: {"a": 1} and the full answer {"summary": "x", "nested": {"b": 2}} done."#;
        let block = extract_json_object(text).unwrap();
        assert_eq!(block, r#"{"summary": "x", "nested": {"b": 2}}"#);
    }

    #[test]
    fn extract_json_object_honors_strings_and_escapes() {
        let text = r#"{"quote": "a \" and a } inside"}"#;
        let block = extract_json_object(text).unwrap();
        assert_eq!(block, text);
        assert!(serde_json::from_str::<serde_json::Value>(block).is_ok());
    }

    #[test]
    fn extract_json_object_none_without_object() {
        assert!(extract_json_object("no json here").is_none());
        assert!(extract_json_object("unbalanced { only").is_none());
    }

    #[test]
    fn parse_structured_output_direct_and_salvaged() {
        let direct = parse_structured_output("t", r#"{"summary": "ok"}"#).unwrap();
        assert_eq!(direct["summary"], "ok");

        let salvaged =
            parse_structured_output("t", "Sure! Here is the JSON:\n{\"summary\": \"ok\"}\nAnything else?")
                .unwrap();
        assert_eq!(salvaged["summary"], "ok");

        let err = parse_structured_output("t", "I cannot produce JSON").unwrap_err();
        assert!(matches!(err, AgentError::MalformedOutput { .. }));
    }

    #[test]
    fn merge_parameters_caller_wins() {
        let mut defaults = serde_json::Map::new();
        defaults.insert("summary_type".into(), serde_json::json!("comprehensive"));
        defaults.insert("max_length".into(), serde_json::json!(500));

        let mut caller = serde_json::Map::new();
        caller.insert("summary_type".into(), serde_json::json!("brief"));

        let merged = merge_parameters(defaults, &caller);
        assert_eq!(merged["summary_type"], "brief");
        assert_eq!(merged["max_length"], 500);
    }
}
