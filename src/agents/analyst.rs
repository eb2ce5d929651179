//! Analyst support agent.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::agents::{
    Agent, AgentCapabilities, AgentOutput, parse_structured_output, read_confidence,
    validate_parameters,
};
use crate::error::AgentError;
use crate::llm::{GenerationProvider, GenerationRequest, RetryPolicy, with_retry};

const AGENT_TYPE: &str = "analyst_support";

const ANALYSIS_TYPES: &[&str] = &[
    "comparative",
    "pros_cons",
    "scenario",
    "sensitivity",
    "comprehensive",
];

const SYSTEM_PROMPT: &str = "You are a research analyst's assistant. You \
produce grounded, decision-oriented analysis of the supplied content, \
without speculating beyond it. Respond with a single JSON object and \
nothing else.";

/// Decision-support analysis over ingested content. The analysis type picks
/// the framing; benchmark, recommendation, and risk sections are toggled by
/// parameters.
pub struct AnalystSupportAgent {
    provider: Arc<dyn GenerationProvider>,
    retry: RetryPolicy,
}

impl AnalystSupportAgent {
    pub fn new(provider: Arc<dyn GenerationProvider>, retry: RetryPolicy) -> Self {
        Self { provider, retry }
    }

    fn build_prompt(
        &self,
        input: &str,
        analysis_type: &str,
        include_benchmarks: bool,
        include_recommendations: bool,
        include_risk_assessment: bool,
    ) -> String {
        let mut fields = vec![
            r#""analysis": string (the analysis narrative)"#.to_string(),
            r#""findings": array of strings (key analytical findings)"#.to_string(),
        ];
        if include_benchmarks {
            fields.push(r#""benchmarks": array of strings (relevant comparison points)"#.to_string());
        }
        if include_recommendations {
            fields.push(r#""recommendations": array of strings"#.to_string());
        }
        if include_risk_assessment {
            fields.push(r#""risks": array of strings (risk assessment)"#.to_string());
        }
        fields.push(r#""confidence": number between 0 and 1"#.to_string());

        format!(
            "Perform a {analysis_type} analysis of the following content.\n\n\
Return a JSON object with these fields:\n{}\n\nContent:\n{input}",
            fields.join("\n")
        )
    }
}

#[async_trait]
impl Agent for AnalystSupportAgent {
    fn agent_type(&self) -> &str {
        AGENT_TYPE
    }

    fn model(&self) -> Option<String> {
        Some(self.provider.model_name().to_string())
    }

    fn capabilities(&self) -> AgentCapabilities {
        AgentCapabilities {
            agent_type: AGENT_TYPE.to_string(),
            parameter_modes: ANALYSIS_TYPES.iter().map(|s| s.to_string()).collect(),
            input_types: vec!["text".into(), "json".into(), "csv".into()],
            output_types: vec!["text".into(), "structured_data".into()],
            max_input_size: 100_000,
            estimated_duration: Duration::from_secs(90),
            version: "1.0.0".to_string(),
        }
    }

    fn default_parameters(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut defaults = serde_json::Map::new();
        defaults.insert("analysis_type".into(), serde_json::json!("comparative"));
        defaults.insert("include_benchmarks".into(), serde_json::json!(true));
        defaults.insert("include_recommendations".into(), serde_json::json!(true));
        defaults.insert("include_risk_assessment".into(), serde_json::json!(true));
        defaults
    }

    async fn process(
        &self,
        input: &str,
        parameters: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<AgentOutput, AgentError> {
        validate_parameters(AGENT_TYPE, parameters, self.required_parameters())?;

        let analysis_type = parameters
            .get("analysis_type")
            .and_then(|v| v.as_str())
            .unwrap_or("comparative");
        let include_benchmarks = parameters
            .get("include_benchmarks")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);
        let include_recommendations = parameters
            .get("include_recommendations")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);
        let include_risk_assessment = parameters
            .get("include_risk_assessment")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);

        let prompt = self.build_prompt(
            input,
            analysis_type,
            include_benchmarks,
            include_recommendations,
            include_risk_assessment,
        );
        let request = GenerationRequest::new(prompt)
            .with_system(SYSTEM_PROMPT)
            .with_temperature(0.4);

        tracing::debug!(agent = AGENT_TYPE, analysis_type, "generating analysis");
        let response = with_retry(&self.retry, || {
            self.provider.generate(request.clone())
        })
        .await?;

        let structured = parse_structured_output(AGENT_TYPE, &response.content)?;

        let content = structured
            .get("analysis")
            .and_then(|v| v.as_str())
            .unwrap_or(response.content.as_str())
            .to_string();
        let title = format!("Analyst briefing ({analysis_type})");
        let confidence = read_confidence(&structured, 0.8);

        Ok(AgentOutput {
            title,
            content,
            structured,
            confidence,
            steps: vec![
                "validate_parameters".into(),
                "build_prompt".into(),
                "generate".into(),
                "parse_output".into(),
            ],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerationError;
    use crate::llm::GenerationResponse;

    struct ScriptedProvider {
        reply: &'static str,
    }

    #[async_trait]
    impl GenerationProvider for ScriptedProvider {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn generate(
            &self,
            _request: GenerationRequest,
        ) -> Result<GenerationResponse, GenerationError> {
            Ok(GenerationResponse {
                content: self.reply.to_string(),
            })
        }
    }

    fn agent(reply: &'static str) -> AnalystSupportAgent {
        AnalystSupportAgent::new(
            Arc::new(ScriptedProvider { reply }),
            RetryPolicy {
                base_delay: Duration::from_millis(1),
                ..RetryPolicy::default()
            },
        )
    }

    #[tokio::test]
    async fn parses_clean_json_output() {
        let agent = agent(
            r#"{"analysis": "Margins compress under both scenarios.", "findings": ["margin pressure"], "risks": ["rate shock"], "confidence": 0.87}"#,
        );
        let output = agent
            .process("quarterly figures", &agent.default_parameters())
            .await
            .unwrap();

        assert_eq!(output.title, "Analyst briefing (comparative)");
        assert_eq!(output.content, "Margins compress under both scenarios.");
        assert_eq!(output.confidence, 0.87);
        assert!(output.structured.contains_key("findings"));
        assert_eq!(output.steps.last().unwrap(), "parse_output");
    }

    #[tokio::test]
    async fn analysis_type_flows_into_the_title() {
        let agent = agent(r#"{"analysis": "Upside and downside are balanced."}"#);
        let mut params = agent.default_parameters();
        params.insert("analysis_type".into(), serde_json::json!("scenario"));
        let output = agent.process("text", &params).await.unwrap();

        assert_eq!(output.title, "Analyst briefing (scenario)");
        // No self-reported score; the agent's baseline applies.
        assert_eq!(output.confidence, 0.8);
    }

    #[tokio::test]
    async fn malformed_output_fails_hard() {
        let agent = agent("I cannot analyze this content.");
        let err = agent
            .process("text", &agent.default_parameters())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::MalformedOutput { .. }));
        assert!(!err.is_retryable());
    }
}
