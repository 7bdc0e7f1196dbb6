use crate::traits::ArgumentSchema;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Provider-facing description of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn schema(&self) -> ArgumentSchema;

    /// Runs the tool. `args` has already been validated against
    /// [`Tool::schema`], so every declared parameter with a default is
    /// present.
    async fn execute(&self, args: serde_json::Value) -> anyhow::Result<String>;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.schema().to_json_schema(),
        }
    }
}
