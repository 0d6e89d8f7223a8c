// Tool trait and the registry the protocol server dispatches through

use crate::protocol::{CallToolResult, ToolSchema};
use crate::tools::schema::validate_arguments;
use std::collections::BTreeMap;
use std::sync::Arc;
use toolhost_core::{ToolhostError, ToolhostResult};

/// A named, schema-validated action
///
/// Tools hold no state between calls. `execute` is only invoked after
/// `validate` succeeded for the same arguments.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool schema for MCP
    fn schema(&self) -> ToolSchema;

    /// Check arguments against the declared input schema
    fn validate(&self, arguments: &serde_json::Value) -> ToolhostResult<()> {
        validate_arguments(&self.schema().input_schema, arguments)
    }

    /// Execute the tool with validated arguments
    async fn execute(&self, arguments: serde_json::Value) -> ToolhostResult<CallToolResult>;
}

/// Tool registry for managing available tools
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any previous tool with the same name
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let schema = tool.schema();
        if self.tools.insert(schema.name.clone(), tool).is_some() {
            tracing::warn!("Tool {} registered twice, keeping the latest", schema.name);
        }
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// List all tool schemas, ordered by name
    pub fn list_schemas(&self) -> Vec<ToolSchema> {
        self.tools.values().map(|t| t.schema()).collect()
    }

    /// Check if a tool exists
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Look up, validate, then execute
    pub async fn call(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> ToolhostResult<CallToolResult> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolhostError::Argument(format!("unknown tool '{}'", name)))?;

        tool.validate(&arguments)?;

        tracing::debug!(tool = name, "Executing tool");
        tool.execute(arguments).await
    }
}

impl FromIterator<Arc<dyn Tool>> for ToolRegistry {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Tool>>>(tools: I) -> Self {
        let mut registry = Self::new();
        for tool in tools {
            registry.register(tool);
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{json_schema_object, json_schema_string};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingTool {
        executions: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Tool for FailingTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "failing".to_string(),
                description: "Always fails".to_string(),
                input_schema: json_schema_object(
                    serde_json::json!({ "path": json_schema_string("Path") }),
                    vec!["path"],
                ),
            }
        }

        async fn execute(&self, _arguments: serde_json::Value) -> ToolhostResult<CallToolResult> {
            self.executions.fetch_add(1, Ordering::SeqCst);
            Err(ToolhostError::Execution("disk on fire".to_string()))
        }
    }

    #[tokio::test]
    async fn test_call_validates_before_execute() {
        let tool = Arc::new(FailingTool {
            executions: AtomicUsize::new(0),
        });
        let mut registry = ToolRegistry::new();
        registry.register(tool.clone());

        let err = registry.call("failing", serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ToolhostError::Argument(_)));
        assert_eq!(tool.executions.load(Ordering::SeqCst), 0);

        let err = registry
            .call("failing", serde_json::json!({"path": "a"}))
            .await
            .unwrap_err();
        assert_eq!(err, ToolhostError::Execution("disk on fire".to_string()));
        assert_eq!(tool.executions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let registry = ToolRegistry::new();
        assert!(registry.is_empty());

        let err = registry.call("nope", serde_json::Value::Null).await.unwrap_err();
        assert!(matches!(err, ToolhostError::Argument(msg) if msg.contains("nope")));
    }
}
