// Resource and tool hosting over the Model Context Protocol (JSON-RPC 2.0)

pub mod codec;
pub mod plugin;
pub mod protocol;
pub mod resources;
pub mod server;
pub mod tools;

pub use plugin::{run_scoped, ExamplePlugin, LifecycleState, Plugin};
pub use server::McpServer;
