use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::invoker::{AgentRunner, RunRequest};

pub const EXTENSION_OUTPUT_MARKER: &str = "EXTENSION_OUTPUT:";

/// Outcome of one executor call.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub id: String,
    pub success: bool,
    pub output: String,
    pub extensions_output: Value,
    pub context: Option<Value>,
    pub timestamp: String,
}

/// What followed the `EXTENSION_OUTPUT:` marker, if anything.
#[derive(Debug, Clone, PartialEq)]
pub enum StructuredOutput {
    Absent,
    Parsed(Map<String, Value>),
    /// Marker present but the trailing payload was not a JSON object. It is
    /// dropped and the human-readable prefix is kept.
    Malformed,
}

/// Split cleaned agent output into its human-readable part and the
/// structured extension output.
pub fn split_extension_output(output: &str) -> (String, StructuredOutput) {
    let Some((prefix, rest)) = output.split_once(EXTENSION_OUTPUT_MARKER) else {
        return (output.to_string(), StructuredOutput::Absent);
    };
    // Only the segment up to a second marker is the payload.
    let payload = rest
        .split_once(EXTENSION_OUTPUT_MARKER)
        .map_or(rest, |(first, _)| first);

    let prefix = prefix.trim().to_string();
    match serde_json::from_str::<Value>(payload.trim()) {
        Ok(Value::Object(map)) => (prefix, StructuredOutput::Parsed(map)),
        _ => (prefix, StructuredOutput::Malformed),
    }
}

/// Null and `{}` count as no context: the prompt is sent bare.
pub fn build_enhanced_prompt(prompt: &str, context: Option<&Value>) -> Result<String> {
    match context.filter(|ctx| !is_empty_context(ctx)) {
        Some(ctx) => Ok(format!(
            "contexts:\n{}\n\nprompts:\n{}",
            serde_json::to_string_pretty(ctx)?,
            prompt
        )),
        None => Ok(prompt.to_string()),
    }
}

fn is_empty_context(ctx: &Value) -> bool {
    match ctx {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Builds the prompt, runs the agent and interprets what it printed.
#[derive(Clone)]
pub struct TaskExecutor {
    runner: Arc<dyn AgentRunner>,
}

impl TaskExecutor {
    pub fn new(runner: Arc<dyn AgentRunner>) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &Arc<dyn AgentRunner> {
        &self.runner
    }

    pub async fn execute(
        &self,
        prompt: &str,
        context: Option<&Value>,
        extensions: &[String],
        session_name: Option<&str>,
    ) -> Result<ExecutionResult> {
        let text = build_enhanced_prompt(prompt, context)?;
        let request = RunRequest {
            text,
            session_name: session_name.map(str::to_string),
            resume: false,
            extensions: extensions.to_vec(),
        };

        let invocation = self.runner.run_with_text(&request).await;
        let id = uuid::Uuid::new_v4().to_string();
        let timestamp = Utc::now().to_rfc3339();

        if !invocation.success {
            let error = invocation.stderr.unwrap_or_default();
            warn!("Task {} failed: {}", id, error.trim());
            return Ok(ExecutionResult {
                id,
                success: false,
                output: error,
                extensions_output: Value::Object(Map::new()),
                context: context.cloned(),
                timestamp,
            });
        }

        let (output, structured) = split_extension_output(&invocation.stdout);
        let extensions_output = match structured {
            StructuredOutput::Parsed(map) => Value::Object(map),
            StructuredOutput::Malformed => {
                warn!("Task {}: ignoring malformed extension output", id);
                Value::Object(Map::new())
            }
            StructuredOutput::Absent => Value::Object(Map::new()),
        };

        info!("Task {} completed ({} chars of output)", id, output.len());
        Ok(ExecutionResult {
            id,
            success: true,
            output,
            extensions_output,
            context: context.cloned(),
            timestamp,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::StubRunner;
    use super::*;
    use serde_json::json;

    #[test]
    fn split_without_marker_keeps_output() {
        let (out, structured) = split_extension_output("  just text \n");
        assert_eq!(out, "  just text \n");
        assert_eq!(structured, StructuredOutput::Absent);
    }

    #[test]
    fn split_parses_trailing_object() {
        let (out, structured) = split_extension_output("Done.\nEXTENSION_OUTPUT: {\"k\":1}\n");
        assert_eq!(out, "Done.");
        let StructuredOutput::Parsed(map) = structured else {
            panic!("expected parsed output");
        };
        assert_eq!(map.get("k"), Some(&json!(1)));
    }

    #[test]
    fn split_flags_malformed_payload() {
        let (out, structured) = split_extension_output("Done.\nEXTENSION_OUTPUT: not json");
        assert_eq!(out, "Done.");
        assert_eq!(structured, StructuredOutput::Malformed);

        let (_, structured) = split_extension_output("x EXTENSION_OUTPUT: [1, 2]");
        assert_eq!(structured, StructuredOutput::Malformed);
    }

    #[test]
    fn enhanced_prompt_layout() {
        let ctx = json!({"a": 1});
        let text = build_enhanced_prompt("Do it", Some(&ctx)).unwrap();
        assert_eq!(text, "contexts:\n{\n  \"a\": 1\n}\n\nprompts:\nDo it");
        assert_eq!(build_enhanced_prompt("Do it", None).unwrap(), "Do it");
    }

    #[test]
    fn split_stops_at_second_marker() {
        let (out, structured) = split_extension_output(
            "Done.\nEXTENSION_OUTPUT: {\"k\":1}\nEXTENSION_OUTPUT: {\"k\":2}",
        );
        assert_eq!(out, "Done.");
        let StructuredOutput::Parsed(map) = structured else {
            panic!("expected parsed output");
        };
        assert_eq!(map.get("k"), Some(&json!(1)));
    }

    #[test]
    fn empty_context_sends_bare_prompt() {
        assert_eq!(build_enhanced_prompt("Summarize", Some(&json!({}))).unwrap(), "Summarize");
        assert_eq!(build_enhanced_prompt("Summarize", Some(&Value::Null)).unwrap(), "Summarize");
        assert!(
            build_enhanced_prompt("Summarize", Some(&json!([])))
                .unwrap()
                .starts_with("contexts:\n")
        );
    }

    #[tokio::test]
    async fn empty_context_reaches_agent_without_block() {
        let runner = StubRunner::ok("ok");
        let executor = TaskExecutor::new(runner.clone());
        let ctx = json!({});
        let result = executor.execute("Summarize", Some(&ctx), &[], None).await.unwrap();
        assert!(result.success);
        assert_eq!(result.context, Some(ctx));
        assert_eq!(runner.requests.lock().await[0].text, "Summarize");
    }

    #[tokio::test]
    async fn execute_success_with_structured_output() {
        let runner = StubRunner::ok("Done.\nEXTENSION_OUTPUT: {\"k\":1}");
        let executor = TaskExecutor::new(runner.clone());
        let ctx = json!({"a": 1});

        let result = executor
            .execute("Summarize", Some(&ctx), &["developer".to_string()], Some("s"))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output, "Done.");
        assert_eq!(result.extensions_output, json!({"k": 1}));
        assert_eq!(result.context, Some(ctx));
        assert!(uuid::Uuid::parse_str(&result.id).is_ok());
        assert!(chrono::DateTime::parse_from_rfc3339(&result.timestamp).is_ok());

        let requests = runner.requests.lock().await;
        assert_eq!(requests.len(), 1);
        assert!(requests[0].text.starts_with("contexts:\n"));
        assert!(requests[0].text.ends_with("prompts:\nSummarize"));
        assert_eq!(requests[0].session_name.as_deref(), Some("s"));
        assert_eq!(requests[0].extensions, vec!["developer".to_string()]);
    }

    #[tokio::test]
    async fn execute_failure_returns_stderr_as_output() {
        let executor = TaskExecutor::new(StubRunner::failing("boom"));
        let ctx = json!({"a": 1});
        let result = executor.execute("p", Some(&ctx), &[], None).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.output, "boom");
        assert_eq!(result.extensions_output, json!({}));
        assert_eq!(result.context, Some(ctx));
    }

    #[tokio::test]
    async fn malformed_structured_output_still_succeeds() {
        let executor = TaskExecutor::new(StubRunner::ok("Answer EXTENSION_OUTPUT: {oops"));
        let result = executor.execute("p", None, &[], None).await.unwrap();
        assert!(result.success);
        assert_eq!(result.output, "Answer");
        assert_eq!(result.extensions_output, json!({}));
        assert_eq!(result.context, None);
    }
}
