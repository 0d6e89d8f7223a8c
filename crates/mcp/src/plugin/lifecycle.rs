// Plugin lifecycle state machine: Idle -> Configured -> Running -> Idle

use super::task::{BackgroundTask, TaskSet};
use super::Plugin;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Mutex;
use toolhost_core::{PluginConfig, ToolhostError, ToolhostResult};

/// Lifecycle state of a plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Configured,
    Running,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Configured => "configured",
            Self::Running => "running",
        };
        f.write_str(s)
    }
}

struct RuntimeState {
    lifecycle: LifecycleState,
    config: Option<PluginConfig>,
    tasks: TaskSet,
}

/// Bookkeeping shared by plugin implementations: current state, the active
/// configuration and the background task handles.
///
/// Every transition holds the state lock, so `stop()` has finished waiting
/// for the task before another transition can begin. `tasks` is non-empty
/// exactly while the state is `Running`.
pub struct PluginRuntime {
    name: String,
    state: Mutex<RuntimeState>,
}

impl PluginRuntime {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(RuntimeState {
                lifecycle: LifecycleState::Idle,
                config: None,
                tasks: TaskSet::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Install a configuration. A running task is stopped first.
    pub async fn configure(&self, config: PluginConfig) -> ToolhostResult<()> {
        config.validate()?;

        let mut state = self.state.lock().await;
        if state.lifecycle == LifecycleState::Running {
            tracing::info!(plugin = %self.name, "Reconfiguring running plugin, stopping background task");
            state.tasks.shutdown_all().await;
        }

        state.config = Some(config);
        state.lifecycle = LifecycleState::Configured;
        tracing::debug!(plugin = %self.name, "Plugin configured");
        Ok(())
    }

    /// Spawn the periodic task built from `work`. Requires `Configured`;
    /// a no-op while already `Running`.
    pub async fn start<F, Fut>(&self, work: F) -> ToolhostResult<()>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let mut state = self.state.lock().await;
        match state.lifecycle {
            LifecycleState::Running => {
                tracing::debug!(plugin = %self.name, "Plugin already running");
                return Ok(());
            }
            LifecycleState::Idle => {
                return Err(ToolhostError::Configuration(format!(
                    "plugin {} must be set up before it is started",
                    self.name
                )));
            }
            LifecycleState::Configured => {}
        }

        let interval = state
            .config
            .as_ref()
            .map(PluginConfig::interval)
            .ok_or_else(|| {
                ToolhostError::Configuration(format!("plugin {} has no configuration", self.name))
            })?;

        let task = BackgroundTask::spawn_periodic(format!("{}-updater", self.name), interval, work);
        state.tasks.insert(task);
        state.lifecycle = LifecycleState::Running;

        tracing::info!(plugin = %self.name, ?interval, "Plugin started");
        Ok(())
    }

    /// Cancel and await all tasks, then return to `Idle`. Safe to call in any state.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        if state.lifecycle != LifecycleState::Running {
            return;
        }

        state.tasks.shutdown_all().await;
        state.lifecycle = LifecycleState::Idle;
        tracing::info!(plugin = %self.name, "Plugin stopped");
    }

    pub async fn state(&self) -> LifecycleState {
        self.state.lock().await.lifecycle
    }

    pub async fn config(&self) -> Option<PluginConfig> {
        self.state.lock().await.config.clone()
    }

    pub async fn active_tasks(&self) -> usize {
        self.state.lock().await.tasks.len()
    }
}

/// Run `body` with the plugin set up and started, then stop it on every exit
/// path: success, error, or panic (re-raised once the plugin is stopped).
pub async fn run_scoped<P, F, Fut, T>(plugin: Arc<P>, body: F) -> anyhow::Result<T>
where
    P: Plugin + ?Sized,
    F: FnOnce(Arc<P>) -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let started = async {
        plugin.setup().await?;
        plugin.start().await
    }
    .await;

    if let Err(e) = started {
        plugin.stop().await;
        return Err(anyhow::Error::new(e).context(format!("failed to start plugin {}", plugin.name())));
    }

    let outcome = AssertUnwindSafe(body(plugin.clone())).catch_unwind().await;
    plugin.stop().await;

    match outcome {
        Ok(result) => result,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config() -> PluginConfig {
        PluginConfig {
            update_interval: 1,
            max_items: 10,
            data_dir: None,
        }
    }

    fn noop() -> impl FnMut() -> futures::future::Ready<anyhow::Result<()>> + Send + 'static {
        || futures::future::ready(Ok(()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_transitions() {
        let runtime = PluginRuntime::new("test");
        assert_eq!(runtime.state().await, LifecycleState::Idle);

        let err = runtime.start(noop()).await.unwrap_err();
        assert!(matches!(err, ToolhostError::Configuration(_)));
        assert_eq!(runtime.active_tasks().await, 0);

        runtime.configure(config()).await.unwrap();
        assert_eq!(runtime.state().await, LifecycleState::Configured);

        runtime.start(noop()).await.unwrap();
        runtime.start(noop()).await.unwrap();
        assert_eq!(runtime.state().await, LifecycleState::Running);
        assert_eq!(runtime.active_tasks().await, 1);

        runtime.stop().await;
        assert_eq!(runtime.state().await, LifecycleState::Idle);
        assert_eq!(runtime.active_tasks().await, 0);

        // Stopping twice is harmless
        runtime.stop().await;
        assert_eq!(runtime.state().await, LifecycleState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconfigure_while_running_stops_task() {
        let runtime = PluginRuntime::new("test");
        runtime.configure(config()).await.unwrap();
        runtime.start(noop()).await.unwrap();

        runtime.configure(config()).await.unwrap();
        assert_eq!(runtime.state().await, LifecycleState::Configured);
        assert_eq!(runtime.active_tasks().await, 0);

        runtime.start(noop()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(runtime.active_tasks().await, 1);
        runtime.stop().await;
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let runtime = PluginRuntime::new("test");
        let mut bad = config();
        bad.max_items = 0;

        assert!(runtime.configure(bad).await.is_err());
        assert_eq!(runtime.state().await, LifecycleState::Idle);
    }
}
