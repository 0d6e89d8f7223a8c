// Core types and configuration for the toolhost resource/tool server

pub mod config;
pub mod error;
pub mod types;

pub use config::{ConfigFormat, PluginConfig, ServerConfig};
pub use error::{ToolhostError, ToolhostResult};
pub use types::*;
