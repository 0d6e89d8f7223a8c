// Plugins bundle resources, tools and a periodic background task behind
// one setup/start/stop lifecycle.

pub mod example;
mod lifecycle;
mod task;

pub use example::{ExamplePlugin, Sample, SamplesProvider, SAMPLES_RESOURCE_URI};
pub use lifecycle::{run_scoped, LifecycleState, PluginRuntime};
pub use task::{BackgroundTask, TaskId, TaskSet};

use crate::resources::ResourceProvider;
use crate::tools::Tool;
use std::sync::Arc;
use toolhost_core::ToolhostResult;

#[async_trait::async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    /// Load and validate configuration. Calling it again re-applies the
    /// configuration; a running task is stopped first.
    async fn setup(&self) -> ToolhostResult<()>;

    /// Start the background task. Fails unless `setup` succeeded.
    async fn start(&self) -> ToolhostResult<()>;

    /// Cancel and await the background task. Never fails.
    async fn stop(&self);

    async fn state(&self) -> LifecycleState;

    /// Number of background tasks currently alive
    async fn active_tasks(&self) -> usize;

    async fn is_running(&self) -> bool {
        self.state().await == LifecycleState::Running
    }

    /// Providers this plugin contributes to the resource registry
    fn register_resources(&self) -> Vec<Arc<dyn ResourceProvider>>;

    /// Tools this plugin contributes to the tool registry
    fn register_tools(&self) -> Vec<Arc<dyn Tool>>;
}
