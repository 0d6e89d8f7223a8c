pub mod example;
mod registry;
mod schema;

pub use example::{ExampleTool, EXAMPLE_TOOL_NAME};
pub use registry::{Tool, ToolRegistry};
pub use schema::{
    json_schema_array, json_schema_boolean, json_schema_integer, json_schema_number,
    json_schema_object, json_schema_string, validate_arguments,
};
