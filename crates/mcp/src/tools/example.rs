// Example text-processing tool shipped with the template plugin

use crate::protocol::{CallToolResult, ToolSchema};
use crate::tools::{json_schema_boolean, json_schema_object, json_schema_string, Tool};
use serde::Deserialize;
use toolhost_core::{ToolhostError, ToolhostResult};

pub const EXAMPLE_TOOL_NAME: &str = "example-tool";

/// Echoes text back, optionally upper-cased
#[derive(Debug, Clone, Default)]
pub struct ExampleTool;

impl ExampleTool {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug, Deserialize)]
struct ExampleArgs {
    text: String,
    #[serde(default)]
    uppercase: bool,
}

#[async_trait::async_trait]
impl Tool for ExampleTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: EXAMPLE_TOOL_NAME.to_string(),
            description: "Process a piece of text, optionally converting it to uppercase"
                .to_string(),
            input_schema: json_schema_object(
                serde_json::json!({
                    "text": json_schema_string("Text to process"),
                    "uppercase": json_schema_boolean("Convert the text to uppercase")
                }),
                vec!["text"],
            ),
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> ToolhostResult<CallToolResult> {
        let args: ExampleArgs = serde_json::from_value(arguments).map_err(|e| {
            ToolhostError::Execution(format!("invalid arguments for {}: {}", EXAMPLE_TOOL_NAME, e))
        })?;

        let text = if args.uppercase {
            args.text.to_uppercase()
        } else {
            args.text
        };

        Ok(CallToolResult::text(format!("Processed: {}", text)))
    }
}
