//! Data extraction agent.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::agents::{
    Agent, AgentCapabilities, AgentOutput, parse_structured_output, read_confidence,
    validate_parameters,
};
use crate::error::AgentError;
use crate::llm::{GenerationProvider, GenerationRequest, RetryPolicy, with_retry};

const AGENT_TYPE: &str = "data_extraction";

const EXTRACTION_TYPES: &[&str] = &["tables", "entities", "structured", "financial", "general"];

const SYSTEM_PROMPT: &str = "You are a data extraction assistant. You pull \
structured facts out of unstructured content without inventing values. \
Respond with a single JSON object and nothing else.";

/// Extracts structured data from content. Differs from the summarization
/// agent only in prompt and output schema.
pub struct DataExtractionAgent {
    provider: Arc<dyn GenerationProvider>,
    retry: RetryPolicy,
}

impl DataExtractionAgent {
    pub fn new(provider: Arc<dyn GenerationProvider>, retry: RetryPolicy) -> Self {
        Self { provider, retry }
    }

    fn build_prompt(&self, input: &str, extraction_type: &str) -> String {
        let focus = match extraction_type {
            "tables" => "tabular data: rows, columns, and their values",
            "entities" => "named entities: people, organizations, places, dates",
            "structured" => "any well-defined key/value facts",
            "financial" => "financial figures: amounts, currencies, periods, metrics",
            _ => "the most relevant structured facts",
        };

        format!(
            "Extract {focus} from the following content.\n\nReturn a JSON \
object with these fields:\n\
\"summary\": string (what was extracted)\n\
\"extracted\": object (the extracted data, keyed by name)\n\
\"entities\": array of strings (named entities encountered)\n\
\"follow_ups\": array of strings (suggested next analyses)\n\
\"confidence\": number between 0 and 1\n\nContent:\n{input}"
        )
    }
}

#[async_trait]
impl Agent for DataExtractionAgent {
    fn agent_type(&self) -> &str {
        AGENT_TYPE
    }

    fn model(&self) -> Option<String> {
        Some(self.provider.model_name().to_string())
    }

    fn capabilities(&self) -> AgentCapabilities {
        AgentCapabilities {
            agent_type: AGENT_TYPE.to_string(),
            parameter_modes: EXTRACTION_TYPES.iter().map(|s| s.to_string()).collect(),
            input_types: vec!["text".into(), "html".into(), "markdown".into(), "csv".into()],
            output_types: vec!["structured_data".into()],
            max_input_size: 50_000,
            estimated_duration: Duration::from_secs(45),
            version: "1.0.0".to_string(),
        }
    }

    fn default_parameters(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut defaults = serde_json::Map::new();
        defaults.insert("extraction_type".into(), serde_json::json!("general"));
        defaults.insert("include_metadata".into(), serde_json::json!(true));
        defaults
    }

    async fn process(
        &self,
        input: &str,
        parameters: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<AgentOutput, AgentError> {
        validate_parameters(AGENT_TYPE, parameters, self.required_parameters())?;

        let extraction_type = parameters
            .get("extraction_type")
            .and_then(|v| v.as_str())
            .unwrap_or("general");
        let include_metadata = parameters
            .get("include_metadata")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);

        let request = GenerationRequest::new(self.build_prompt(input, extraction_type))
            .with_system(SYSTEM_PROMPT)
            .with_temperature(0.0);

        tracing::debug!(agent = AGENT_TYPE, extraction_type, "extracting data");
        let response = with_retry(&self.retry, || {
            self.provider.generate(request.clone())
        })
        .await?;

        let mut structured = parse_structured_output(AGENT_TYPE, &response.content)?;
        if include_metadata {
            structured.insert(
                "extraction_metadata".into(),
                serde_json::json!({
                    "extraction_type": extraction_type,
                    "input_length": input.len(),
                }),
            );
        }

        let content = structured
            .get("summary")
            .and_then(|v| v.as_str())
            .unwrap_or(response.content.as_str())
            .to_string();
        let confidence = read_confidence(&structured, 0.8);

        Ok(AgentOutput {
            title: format!("Data extraction ({extraction_type})"),
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

    fn agent(reply: &'static str) -> DataExtractionAgent {
        DataExtractionAgent::new(
            Arc::new(ScriptedProvider { reply }),
            RetryPolicy {
                base_delay: Duration::from_millis(1),
                ..RetryPolicy::default()
            },
        )
    }

    #[tokio::test]
    async fn extracts_and_annotates_metadata() {
        let agent = agent(
            r#"{"summary": "Two figures found.", "extracted": {"revenue": "1.2M"}, "entities": ["Acme"], "confidence": 0.88}"#,
        );
        let output = agent
            .process("Acme reported revenue of 1.2M.", &agent.default_parameters())
            .await
            .unwrap();

        assert_eq!(output.content, "Two figures found.");
        assert_eq!(output.confidence, 0.88);
        let meta = output.structured.get("extraction_metadata").unwrap();
        assert_eq!(meta["extraction_type"], "general");
    }

    #[tokio::test]
    async fn metadata_can_be_disabled() {
        let agent = agent(r#"{"summary": "ok", "extracted": {}}"#);
        let mut params = agent.default_parameters();
        params.insert("include_metadata".into(), serde_json::json!(false));
        let output = agent.process("text", &params).await.unwrap();
        assert!(!output.structured.contains_key("extraction_metadata"));
        assert_eq!(output.confidence, 0.8);
    }

    #[tokio::test]
    async fn prompt_varies_by_extraction_type() {
        let agent = agent("{}");
        let financial = agent.build_prompt("x", "financial");
        let entities = agent.build_prompt("x", "entities");
        assert!(financial.contains("financial figures"));
        assert!(entities.contains("named entities"));
    }
}
