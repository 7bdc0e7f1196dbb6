use crate::error::ToolError;
use crate::tools::{CalculatorTool, CurrentTimeTool, TavilySearchTool};
use crate::traits::{Tool, ToolSpec};
use futures_util::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Outcome of one tool invocation, correlated back to the request that
/// produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallResult {
    pub tool_name: String,
    pub raw_arguments: String,
    pub outcome: Result<String, ToolError>,
}

impl ToolCallResult {
    /// The text fed back to the model as the `tool` message content.
    pub fn content(&self) -> String {
        match &self.outcome {
            Ok(text) => text.clone(),
            Err(e) => format!("Error: {}", e),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn trace(&self) -> ReasoningStep {
        let arguments = serde_json::from_str(&self.raw_arguments)
            .unwrap_or_else(|_| serde_json::Value::String(self.raw_arguments.clone()));
        let (result, error) = match &self.outcome {
            Ok(text) => (Some(text.clone()), None),
            Err(e) => (None, Some(e.to_string())),
        };

        ReasoningStep {
            kind: "tool_call",
            tool: self.tool_name.clone(),
            arguments,
            result,
            error,
        }
    }
}

/// Display-only record of a tool call and its outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReasoningStep {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub tool: String,
    pub arguments: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Name-keyed set of tools. Built once at startup, then shared read-only.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    timeout: Option<Duration>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in tool set: calculator, current_time and tavily_search.
    pub fn with_default_tools(tavily_api_key: Option<String>) -> Self {
        let mut registry = Self::new();
        registry.register(CalculatorTool);
        registry.register(CurrentTimeTool);
        registry.register(TavilySearchTool::new(tavily_api_key));
        registry
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Adds a tool. A tool with the same name replaces the earlier one in
    /// place, so names stay unique and order stays stable.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        let tool: Arc<dyn Tool> = Arc::new(tool);
        match self.tools.iter().position(|t| t.name() == tool.name()) {
            Some(idx) => self.tools[idx] = tool,
            None => self.tools.push(tool),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    pub fn get_specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Looks up, validates and runs a tool. Every failure mode ends up in
    /// the returned outcome; nothing here is fatal to the caller.
    pub async fn invoke(&self, name: &str, raw_arguments: &str) -> ToolCallResult {
        let outcome = self.run(name, raw_arguments).await;
        if let Err(e) = &outcome {
            warn!(tool = name, kind = e.kind(), error = %e, "tool call failed");
        }

        ToolCallResult {
            tool_name: name.to_string(),
            raw_arguments: raw_arguments.to_string(),
            outcome,
        }
    }

    async fn run(&self, name: &str, raw_arguments: &str) -> Result<String, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

        let args = tool
            .schema()
            .validate(raw_arguments)
            .map_err(|reason| ToolError::invalid_arguments(name, reason))?;

        debug!(tool = name, %args, "executing tool");

        let execution = AssertUnwindSafe(tool.execute(args)).catch_unwind();
        let finished = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, execution).await.map_err(|_| {
                ToolError::execution(name, format!("timed out after {}s", limit.as_secs_f64()))
            })?,
            None => execution.await,
        };

        match finished {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(ToolError::execution(name, format!("{:#}", e))),
            Err(panic) => Err(ToolError::execution(name, panic_message(panic.as_ref()))),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("tool panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("tool panicked: {}", s)
    } else {
        "tool panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{ArgumentSchema, ParamSpec};
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::sync::Mutex;

    struct RecordingTool {
        seen: Arc<Mutex<Vec<Value>>>,
    }

    #[async_trait]
    impl Tool for RecordingTool {
        fn name(&self) -> &str {
            "tavily_search"
        }

        fn description(&self) -> &str {
            "records arguments"
        }

        fn schema(&self) -> ArgumentSchema {
            TavilySearchTool::new(None).schema()
        }

        async fn execute(&self, args: Value) -> anyhow::Result<String> {
            self.seen.lock().unwrap().push(args);
            Ok("ok".into())
        }
    }

    struct PanickingTool;

    #[async_trait]
    impl Tool for PanickingTool {
        fn name(&self) -> &str {
            "boom"
        }

        fn description(&self) -> &str {
            "always panics"
        }

        fn schema(&self) -> ArgumentSchema {
            ArgumentSchema::empty()
        }

        async fn execute(&self, _args: Value) -> anyhow::Result<String> {
            panic!("kaboom");
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "sleeps"
        }

        fn schema(&self) -> ArgumentSchema {
            ArgumentSchema::new(vec![ParamSpec::integer("ms", "delay", None, None).required()])
        }

        async fn execute(&self, args: Value) -> anyhow::Result<String> {
            let ms = args["ms"].as_u64().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok("done".into())
        }
    }

    #[test]
    fn default_tools_are_listed_in_stable_order() {
        let registry = ToolRegistry::with_default_tools(None);
        let names: Vec<String> = registry.get_specs().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["calculator", "current_time", "tavily_search"]);
    }

    #[test]
    fn register_replaces_same_name() {
        let mut registry = ToolRegistry::with_default_tools(None);
        registry.register(RecordingTool {
            seen: Arc::default(),
        });
        assert_eq!(registry.tools().len(), 3);
        assert_eq!(registry.get_specs()[2].description, "records arguments");
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_not_raised() {
        let registry = ToolRegistry::with_default_tools(None);
        let result = registry.invoke("weather", r#"{"city": "Oslo"}"#).await;
        assert_eq!(result.outcome, Err(ToolError::NotFound("weather".into())));
        assert_eq!(result.content(), "Error: Tool weather not found");
    }

    #[tokio::test]
    async fn calculator_is_idempotent() {
        let registry = ToolRegistry::with_default_tools(None);
        let first = registry.invoke("calculator", r#"{"expression": "12*7"}"#).await;
        let second = registry.invoke("calculator", r#"{"expression": "12*7"}"#).await;
        assert_eq!(first.content(), "84");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn search_defaults_applied_before_invocation() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ToolRegistry::new();
        registry.register(RecordingTool { seen: seen.clone() });

        let result = registry.invoke("tavily_search", r#"{"query": "x"}"#).await;
        assert!(result.is_success());
        assert_eq!(
            seen.lock().unwrap()[0],
            json!({
                "query": "x",
                "search_depth": "basic",
                "max_results": 5,
                "include_answer": true
            })
        );
    }

    #[tokio::test]
    async fn invalid_arguments_are_absorbed() {
        let registry = ToolRegistry::with_default_tools(None);

        let result = registry.invoke("calculator", "{}").await;
        assert!(matches!(
            result.outcome,
            Err(ToolError::InvalidArguments { .. })
        ));

        let result = registry.invoke("calculator", "not json").await;
        assert!(result.content().starts_with("Error: Invalid arguments for calculator"));
    }

    #[tokio::test]
    async fn execution_errors_carry_original_message() {
        let registry = ToolRegistry::with_default_tools(None);
        let result = registry.invoke("calculator", r#"{"expression": "1/0"}"#).await;
        assert_eq!(
            result.outcome,
            Err(ToolError::execution("calculator", "division by zero"))
        );
        assert_eq!(result.content(), "Error: division by zero");
    }

    #[tokio::test]
    async fn deeply_nested_expression_is_an_execution_error() {
        let registry = ToolRegistry::with_default_tools(None);
        let expression = format!("{}1{}", "(".repeat(20_000), ")".repeat(20_000));
        let payload = json!({ "expression": expression }).to_string();

        let result = registry.invoke("calculator", &payload).await;
        assert_eq!(
            result.outcome,
            Err(ToolError::execution("calculator", "expression nested too deeply"))
        );
    }

    #[tokio::test]
    async fn panics_become_execution_errors() {
        let mut registry = ToolRegistry::new();
        registry.register(PanickingTool);
        let result = registry.invoke("boom", "").await;
        assert_eq!(result.content(), "Error: tool panicked: kaboom");
    }

    #[tokio::test]
    async fn slow_tools_time_out() {
        let mut registry = ToolRegistry::new();
        registry.register(SlowTool);
        let registry = registry.with_timeout(Duration::from_millis(20));

        let result = registry.invoke("slow", r#"{"ms": 5000}"#).await;
        assert_eq!(result.content(), "Error: timed out after 0.02s");

        let result = registry.invoke("slow", r#"{"ms": 1}"#).await;
        assert_eq!(result.content(), "done");
    }

    #[test]
    fn trace_records_parsed_arguments() {
        let result = ToolCallResult {
            tool_name: "calculator".into(),
            raw_arguments: r#"{"expression":"12*7"}"#.into(),
            outcome: Ok("84".into()),
        };
        let trace = serde_json::to_value(result.trace()).unwrap();
        assert_eq!(
            trace,
            json!({
                "type": "tool_call",
                "tool": "calculator",
                "arguments": {"expression": "12*7"},
                "result": "84"
            })
        );
    }
}
